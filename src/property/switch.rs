use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `Switch` element's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SwitchState {
    /// Switch is on.
    On,
    /// Switch is off.
    Off,
}

impl FromStr for SwitchState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "On" => Ok(SwitchState::On),
            "Off" => Ok(SwitchState::Off),
            _ => Err(Error::InvalidSwitchState(s.to_string())),
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchState::On => "On",
            SwitchState::Off => "Off",
        };
        write!(f, "{}", s)
    }
}

/// How many switches in a switch vector may be `On` simultaneously, per the DTD's `%switchRule;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SwitchRule {
    /// Exactly one switch is On.
    OneOfMany,
    /// At most one switch is On.
    AtMostOne,
    /// Any number of switches may be On.
    AnyOfMany,
}

impl fmt::Display for SwitchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchRule::OneOfMany => "OneOfMany",
            SwitchRule::AtMostOne => "AtMostOne",
            SwitchRule::AnyOfMany => "AnyOfMany",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_state_round_trips() {
        assert_eq!(SwitchState::from_str("On").unwrap(), SwitchState::On);
        assert_eq!(SwitchState::from_str("Off").unwrap(), SwitchState::Off);
        assert!(SwitchState::from_str("bogus").is_err());
        assert_eq!(SwitchState::On.to_string(), "On");
    }
}
