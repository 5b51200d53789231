use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a vector property or a `Light` element.
///
/// `Busy` means an operation is in progress; the other three are
/// "settled" states per the GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PropertyState {
    /// Idle, no activity.
    Idle,
    /// Settled, successful.
    Ok,
    /// An operation is in progress.
    Busy,
    /// Settled, failed.
    Alert,
}

impl PropertyState {
    /// `true` for any of {Idle, Ok, Alert} — i.e. not `Busy`.
    pub fn is_settled(self) -> bool {
        !matches!(self, PropertyState::Busy)
    }
}

impl FromStr for PropertyState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Idle" => Ok(PropertyState::Idle),
            "Ok" => Ok(PropertyState::Ok),
            "Busy" => Ok(PropertyState::Busy),
            "Alert" => Ok(PropertyState::Alert),
            _ => Err(Error::Property(format!("invalid property state: {}", s))),
        }
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyState::Idle => "Idle",
            PropertyState::Ok => "Ok",
            PropertyState::Busy => "Busy",
            PropertyState::Alert => "Alert",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_variants() {
        for s in ["Idle", "Ok", "Busy", "Alert"] {
            assert_eq!(s.parse::<PropertyState>().unwrap().to_string(), s);
        }
        assert!("bogus".parse::<PropertyState>().is_err());
    }

    #[test]
    fn only_busy_is_unsettled() {
        assert!(!PropertyState::Busy.is_settled());
        assert!(PropertyState::Idle.is_settled());
        assert!(PropertyState::Ok.is_settled());
        assert!(PropertyState::Alert.is_settled());
    }
}
