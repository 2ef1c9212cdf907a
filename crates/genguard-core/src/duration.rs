//! Serde helpers for config durations.
//!
//! Accepts either an integer number of seconds (`3600`) or a humantime
//! string (`"1h"`, `"30m"`, `"250ms"`). Serializes back to humantime.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(u64),
    Text(String),
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => humantime::parse_duration(text.trim())
            .map_err(|e| de::Error::custom(format!("invalid duration '{}': {}", text, e))),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        value: Duration,
    }

    #[test]
    fn test_parses_seconds_and_humantime() {
        let secs: Holder = serde_json::from_str(r#"{"value": 90}"#).unwrap();
        assert_eq!(secs.value, Duration::from_secs(90));

        let text: Holder = serde_json::from_str(r#"{"value": "30m"}"#).unwrap();
        assert_eq!(text.value, Duration::from_secs(1800));
    }

    #[test]
    fn test_rejects_garbage() {
        let result: Result<Holder, _> = serde_json::from_str(r#"{"value": "soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_as_humantime() {
        let json = serde_json::to_string(&Holder {
            value: Duration::from_secs(3600),
        })
        .unwrap();
        assert_eq!(json, r#"{"value":"1h"}"#);
    }
}
