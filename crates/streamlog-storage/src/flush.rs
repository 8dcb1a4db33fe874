//! Flush Policy
//!
//! Controls when segment files are fdatasynced:
//!
//! - `Never`: no fsync (fastest, least durable)
//! - `OnRoll`: fsync only when the segment closes on roll (balanced, default)
//! - `EachBatch`: fsync log and index after every appended batch (most durable)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When to fdatasync segment files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    Never,
    OnRoll,
    EachBatch,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::OnRoll
    }
}

impl FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(FlushPolicy::Never),
            "on_roll" | "onroll" => Ok(FlushPolicy::OnRoll),
            "each_batch" | "eachbatch" => Ok(FlushPolicy::EachBatch),
            other => Err(format!("unknown flush policy: {other}")),
        }
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushPolicy::Never => "never",
            FlushPolicy::OnRoll => "on_roll",
            FlushPolicy::EachBatch => "each_batch",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_policies() {
        assert_eq!("never".parse::<FlushPolicy>().unwrap(), FlushPolicy::Never);
        assert_eq!("on_roll".parse::<FlushPolicy>().unwrap(), FlushPolicy::OnRoll);
        assert_eq!(
            "each_batch".parse::<FlushPolicy>().unwrap(),
            FlushPolicy::EachBatch
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("NEVER".parse::<FlushPolicy>().unwrap(), FlushPolicy::Never);
        assert_eq!("On_Roll".parse::<FlushPolicy>().unwrap(), FlushPolicy::OnRoll);
    }

    #[test]
    fn test_parse_unknown_fails() {
        assert!("sometimes".parse::<FlushPolicy>().is_err());
        assert!("".parse::<FlushPolicy>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for policy in [FlushPolicy::Never, FlushPolicy::OnRoll, FlushPolicy::EachBatch] {
            let parsed: FlushPolicy = policy.to_string().parse().unwrap();
            assert_eq!(parsed, policy);
        }
    }

    #[test]
    fn test_default_is_on_roll() {
        assert_eq!(FlushPolicy::default(), FlushPolicy::OnRoll);
    }
}
