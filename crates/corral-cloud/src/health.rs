//! Device health as reported through status strings.
//!
//! Devices report free-form status lines prefixed with a verdict tag
//! ("OK: booted", "KO: worker crashed"). Command delivery is gated on the
//! core-OS verdict so a wedged device is not handed more work.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Ok,
    Ko,
    Unknown,
}

impl Health {
    /// Parse the verdict prefix of a status line.
    pub fn from_status(status: &str) -> Self {
        if status.starts_with("OK") {
            Self::Ok
        } else if status.starts_with("KO") {
            Self::Ko
        } else {
            Self::Unknown
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Ko => write!(f, "KO"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn verdict_prefixes() {
        assert_eq!(Health::from_status("OK"), Health::Ok);
        assert_eq!(Health::from_status("OK: session started"), Health::Ok);
        assert_eq!(Health::from_status("KO: worker crashed"), Health::Ko);
        assert_eq!(Health::from_status("Unknown"), Health::Unknown);
        assert_eq!(Health::from_status(""), Health::Unknown);
        assert_eq!(Health::from_status("ok lowercase"), Health::Unknown);
    }

    #[test]
    fn only_ok_allows_delivery() {
        assert!(Health::from_status("OK: idle").is_ok());
        assert!(!Health::from_status("KO: flash full").is_ok());
        assert!(!Health::from_status("UN").is_ok());
    }
}
