//! Duration fields of `config.toml`
//!
//! The file stores durations as plain integers: `terminate_timeout` and
//! `dial_timeout` in seconds, `settle_delay` in milliseconds.

/// `Duration` as whole seconds; sub-second parts are dropped on write
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// `Duration` as whole milliseconds
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        dial: Duration,
        #[serde(with = "duration_millis")]
        settle: Duration,
    }

    #[test]
    fn test_duration_serialize() {
        let config = Timeouts {
            dial: Duration::from_secs(30),
            settle: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"dial":30,"settle":250}"#);
    }

    #[test]
    fn test_seconds_drop_fraction() {
        let config = Timeouts {
            dial: Duration::from_millis(2900),
            settle: Duration::ZERO,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"dial":2,"settle":0}"#);
    }

    #[test]
    fn test_duration_deserialize() {
        let config: Timeouts = serde_json::from_str(r#"{"dial":60,"settle":1500}"#).unwrap();
        assert_eq!(config.dial, Duration::from_secs(60));
        assert_eq!(config.settle, Duration::from_millis(1500));
    }
}
