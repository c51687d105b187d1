//! Address and interface-name helpers shared by the lifecycle objects.

pub mod addr;
pub mod ifname;
