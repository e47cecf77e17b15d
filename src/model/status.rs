//! Derived packing status and outfeed run status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Packing progress of one order line, recomputed on every reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingStatus {
    Pending,
    Partially,
    BeingPacked,
    Done,
    Shipped,
}

impl PackingStatus {
    /// Work on the line is finished: nothing left to pack.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Done | Self::Shipped)
    }
}

/// Whether an outfeed is currently packing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutfeedStatus {
    Running,
    #[default]
    Paused,
}

impl OutfeedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for OutfeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is neither `RUNNING` nor `PAUSED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl FromStr for OutfeedStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outfeed_status_parses_exact_values_only() {
        assert_eq!("RUNNING".parse(), Ok(OutfeedStatus::Running));
        assert_eq!("PAUSED".parse(), Ok(OutfeedStatus::Paused));
        assert_eq!(
            "running".parse::<OutfeedStatus>(),
            Err(UnknownStatus("running".into()))
        );
    }

    #[test]
    fn only_done_and_shipped_are_complete() {
        assert!(PackingStatus::Done.is_complete());
        assert!(PackingStatus::Shipped.is_complete());
        assert!(!PackingStatus::BeingPacked.is_complete());
        assert!(!PackingStatus::Partially.is_complete());
        assert!(!PackingStatus::Pending.is_complete());
    }

    #[test]
    fn packing_status_serializes_snake_case() {
        let json = serde_json::to_string(&PackingStatus::BeingPacked).unwrap();
        assert_eq!(json, "\"being_packed\"");
    }
}
