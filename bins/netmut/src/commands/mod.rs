//! Command implementations.

pub mod addr;
pub mod link;
pub mod nft;
pub mod veth;
