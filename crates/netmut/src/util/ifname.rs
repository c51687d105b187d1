//! Interface name validation.

use crate::netlink::{Error, Result};

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Validate an interface name before it is sent to the kernel.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }

    if name.len() >= IFNAMSIZ {
        return Err(Error::InvalidName(format!(
            "{}: name too long (max {} chars)",
            name,
            IFNAMSIZ - 1
        )));
    }

    if name.contains(['/', '\0']) || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(format!(
            "{:?}: name contains invalid characters",
            name
        )));
    }

    Ok(())
}
