//! Fixed-size family headers and attribute tags.

pub mod addr;
pub mod link;
pub mod nfgen;
