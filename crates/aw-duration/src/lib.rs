//! `serde` (de)serialization helpers for [`std::time::Duration`] fields that
//! must accept either a human-readable string (`"2s"`, `"500ms"`, `"5m"`) or a
//! plain millisecond integer, and that always serialize back out as
//! milliseconds so the value round-trips through the lock-file cache and
//! config files without ambiguity.
//!
//! Used wherever a compiler-facing duration is stored: retry backoff config,
//! MCP connection-retry backoff, action-pin cache TTLs.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Deserialize a [`Duration`] from either a human-readable string or a `u64`
/// of milliseconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a [`Duration`] as milliseconds so it round-trips with
/// [`deserialize_duration`].
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Parse a human-readable duration string (`"2s"`, `"1m30s"`), for use in CLI
/// argument parsing where there is no surrounding serde context.
pub fn parse(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// A thin wrapper that derives [`Serialize`]/[`Deserialize`] via the helpers
/// above, for types that want a bare `Duration` field without repeating the
/// `#[serde(with = "...")]` boilerplate at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_duration(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_duration(deserializer).map(HumanDuration)
    }
}

impl From<Duration> for HumanDuration {
    fn from(d: Duration) -> Self {
        HumanDuration(d)
    }
}

impl From<HumanDuration> for Duration {
    fn from(h: HumanDuration) -> Self {
        h.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(
            deserialize_with = "deserialize_duration",
            serialize_with = "serialize_duration"
        )]
        d: Duration,
    }

    #[test]
    fn roundtrips_through_milliseconds() {
        let w = Wrapper {
            d: Duration::from_millis(1500),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"d":1500}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.d, w.d);
    }

    #[test]
    fn accepts_human_readable_strings() {
        let w: Wrapper = serde_json::from_str(r#"{"d":"2s"}"#).unwrap();
        assert_eq!(w.d, Duration::from_secs(2));

        let w: Wrapper = serde_json::from_str(r#"{"d":"1m30s"}"#).unwrap();
        assert_eq!(w.d, Duration::from_secs(90));
    }

    #[test]
    fn rejects_garbage_strings() {
        let err = serde_json::from_str::<Wrapper>(r#"{"d":"not-a-duration"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn human_duration_wrapper_roundtrips() {
        let hd = HumanDuration(Duration::from_secs(5));
        let json = serde_json::to_string(&hd).unwrap();
        let back: HumanDuration = serde_json::from_str(&json).unwrap();
        assert_eq!(Duration::from(back), Duration::from_secs(5));
    }
}
