//! Snowflake codec.
//!
//! A snowflake packs its creation time and origin into 64 bits:
//!
//! ```text
//!  63                                          22 21    17 16    12 11          0
//! ┌──────────────────────────────────────────────┬────────┬────────┬─────────────┐
//! │ milliseconds since SNOWFLAKE_EPOCH_MS (42)   │ worker │ process│  increment  │
//! └──────────────────────────────────────────────┴────────┴────────┴─────────────┘
//! ```
//!
//! On the wire snowflakes travel as decimal strings because many JSON
//! consumers cannot represent a full u64.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// Service epoch (2015-01-01T00:00:00Z) in milliseconds since the Unix epoch.
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

/// Bits below the timestamp.
const TIMESTAMP_SHIFT: u32 = 22;

/// Largest timestamp offset that fits in the 42 timestamp bits.
const TIMESTAMP_OFFSET_MAX: u64 = (1 << 42) - 1;

const WORKER_MASK: u64 = 0x3E_0000;
const PROCESS_MASK: u64 = 0x1_F000;
const INCREMENT_MASK: u64 = 0xFFF;

/// A 64-bit, time-ordered unique identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Creates a snowflake from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses a snowflake from its decimal text form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if the text is empty,
    /// contains anything other than ASCII digits, or overflows a u64.
    pub fn parse(text: &str) -> CoreResult<Self> {
        if text.is_empty() {
            return Err(CoreError::malformed(text, "empty"));
        }
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::malformed(text, "not a decimal number"));
        }
        text.parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::malformed(text, "exceeds u64 range"))
    }

    /// Formats the snowflake as decimal text.
    #[must_use]
    pub fn format(self) -> String {
        self.0.to_string()
    }

    /// Milliseconds since the Unix epoch at which this id was created.
    #[must_use]
    pub const fn timestamp_ms(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) + SNOWFLAKE_EPOCH_MS
    }

    /// Instant at which this id was created.
    #[must_use]
    pub fn timestamp(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.timestamp_ms())
    }

    /// Internal worker that generated the id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Masked to 5 bits.
    pub const fn worker_id(self) -> u8 {
        ((self.0 & WORKER_MASK) >> 17) as u8
    }

    /// Internal process that generated the id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Masked to 5 bits.
    pub const fn process_id(self) -> u8 {
        ((self.0 & PROCESS_MASK) >> 12) as u8
    }

    /// Per-process increment.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Masked to 12 bits.
    pub const fn increment(self) -> u16 {
        (self.0 & INCREMENT_MASK) as u16
    }

    /// Returns the smallest snowflake created at `timestamp_ms`.
    ///
    /// Useful as a pagination bound ("messages after this time"). Returns
    /// `None` for times before the service epoch or past the 42-bit range.
    #[must_use]
    pub const fn from_timestamp_ms(timestamp_ms: u64) -> Option<Self> {
        if timestamp_ms < SNOWFLAKE_EPOCH_MS {
            return None;
        }
        let offset = timestamp_ms - SNOWFLAKE_EPOCH_MS;
        if offset > TIMESTAMP_OFFSET_MAX {
            return None;
        }
        Some(Self(offset << TIMESTAMP_SHIFT))
    }

    /// Returns the smallest snowflake created at `time`.
    #[must_use]
    pub fn from_timestamp(time: SystemTime) -> Option<Self> {
        let ms = time.duration_since(UNIX_EPOCH).ok()?.as_millis();
        Self::from_timestamp_ms(u64::try_from(ms).ok()?)
    }
}

impl fmt::Debug for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snowflake({})", self.0)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct SnowflakeVisitor;

impl Visitor<'_> for SnowflakeVisitor {
    type Value = Snowflake;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snowflake as a decimal string or unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(Snowflake(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(Snowflake)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Snowflake::parse(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid() {
        let id = Snowflake::parse("175928847299117063").unwrap();
        assert_eq!(id.get(), 175_928_847_299_117_063);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "-1", "12a", " 1", "1.0", "+5", "18446744073709551616"] {
            assert!(
                matches!(
                    Snowflake::parse(input),
                    Err(CoreError::MalformedIdentifier { .. })
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_max() {
        let id = Snowflake::parse("18446744073709551615").unwrap();
        assert_eq!(id.get(), u64::MAX);
    }

    #[test]
    fn test_components() {
        // Documented example id from the service.
        let id = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(id.timestamp_ms(), 1_462_015_105_796);
        assert_eq!(id.worker_id(), 1);
        assert_eq!(id.process_id(), 0);
        assert_eq!(id.increment(), 7);
    }

    #[test]
    fn test_from_timestamp() {
        let id = Snowflake::from_timestamp_ms(1_462_015_105_796).unwrap();
        assert_eq!(id.timestamp_ms(), 1_462_015_105_796);
        assert_eq!(id.increment(), 0);
        assert!(Snowflake::from_timestamp_ms(SNOWFLAKE_EPOCH_MS - 1).is_none());
    }

    #[test]
    fn test_serde_string_and_number() {
        let id: Snowflake = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(id.get(), 42);
        let id: Snowflake = serde_json::from_str("42").unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
        assert!(serde_json::from_str::<Snowflake>("\"x\"").is_err());
        assert!(serde_json::from_str::<Snowflake>("-3").is_err());
    }

    #[test]
    fn test_ordering_follows_time() {
        let early = Snowflake::from_timestamp_ms(SNOWFLAKE_EPOCH_MS + 1_000).unwrap();
        let late = Snowflake::from_timestamp_ms(SNOWFLAKE_EPOCH_MS + 2_000).unwrap();
        assert!(early < late);
        assert!(early.timestamp() < late.timestamp());
    }

    proptest! {
        #[test]
        fn prop_format_parse_round_trip(raw in any::<u64>()) {
            let id = Snowflake::new(raw);
            prop_assert_eq!(Snowflake::parse(&id.format()).unwrap(), id);
        }

        #[test]
        fn prop_timestamp_round_trip(offset in 0u64..(1u64 << 42)) {
            let ms = SNOWFLAKE_EPOCH_MS + offset;
            let id = Snowflake::from_timestamp_ms(ms).unwrap();
            prop_assert_eq!(id.timestamp_ms(), ms);
        }
    }
}
