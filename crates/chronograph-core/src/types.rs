//! Core types for Chronograph
//!
//! - Timestamps and the "open" sentinel used on disk for current versions
//! - The open data map carried by every version

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Free-form payload carried by every node and edge version
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`.
const ZERO_TIME_UNIX_SECONDS: i64 = -62_135_596_800;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// The zero instant `0001-01-01T00:00:00Z`.
///
/// History files encode "still open" as this value in `valid_until`, and an
/// unset `created_at`/`valid_from` reads back as it as well.
pub fn zero_time() -> Timestamp {
    DateTime::<Utc>::from_timestamp(ZERO_TIME_UNIX_SECONDS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whether `t` is the zero instant
pub fn is_zero_time(t: &Timestamp) -> bool {
    *t == zero_time()
}

/// Serde adapter mapping `Option<Timestamp>` to the on-disk sentinel.
///
/// `None` is written as the zero instant; the zero instant and `null` both
/// read back as `None`.
pub mod open_time {
    use super::{is_zero_time, zero_time, Timestamp};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => t.serialize(serializer),
            None => zero_time().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<Timestamp> = Option::deserialize(deserializer)?;
        Ok(raw.filter(|t| !is_zero_time(t)))
    }
}

/// Read a `null` data map as an empty one
pub(crate) fn nullable_map<'de, D>(deserializer: D) -> Result<DataMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DataMap>::deserialize(deserializer)?.unwrap_or_default())
}

/// Build a [`DataMap`] from a `serde_json::json!({...})` object literal.
///
/// Non-object values produce an empty map.
pub fn data_map(value: serde_json::Value) -> DataMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => DataMap::new(),
    }
}
