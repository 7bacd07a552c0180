//! Strongly-typed identifiers for remote entities.
//!
//! Each wrapper holds a [`Snowflake`] and adds nothing at runtime. Relations
//! between entities (member → guild, role → guild) are expressed with these
//! ids and resolved through the cache, never with owning pointers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::snowflake::Snowflake;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a [`Snowflake`] and provides:
/// - Type safety (can't mix `GuildId` with `UserId`)
/// - Debug/Display formatting
/// - Decimal-string serde, like the bare snowflake
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(Snowflake);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(Snowflake::new(value))
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0.get()
            }

            /// Returns the underlying snowflake.
            #[inline]
            #[must_use]
            pub const fn snowflake(self) -> Snowflake {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0.get())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Snowflake::parse(s).map(Self)
            }
        }

        impl From<Snowflake> for $name {
            fn from(value: Snowflake) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Snowflake {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Snowflake::deserialize(deserializer).map(Self)
            }
        }
    };
}

// Containers.
define_id!(GuildId, "guild", "Identifier of a guild, the parent of most cached entities.");
define_id!(ChannelId, "channel", "Identifier of a channel.");
define_id!(RoleId, "role", "Identifier of a role within a guild.");

// Principals.
define_id!(UserId, "user", "Identifier of a user account.");
define_id!(ApplicationId, "application", "Identifier of an application.");

// Content.
define_id!(MessageId, "message", "Identifier of a message.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let guild = GuildId::new(1);
        let user = UserId::new(1);

        // Same raw value, different types.
        assert_eq!(guild.get(), user.get());
        assert_eq!(guild.snowflake(), user.snowflake());
    }

    #[test]
    fn test_id_display() {
        let guild = GuildId::new(42);
        assert_eq!(format!("{guild}"), "42");
        assert_eq!(format!("{guild:?}"), "guild(42)");
    }

    #[test]
    fn test_id_from_str() {
        let role: RoleId = "81384788765712384".parse().unwrap();
        assert_eq!(role.get(), 81_384_788_765_712_384);
        assert!("nope".parse::<RoleId>().is_err());
    }

    #[test]
    fn test_id_serde() {
        let user: UserId = serde_json::from_str("\"80351110224678912\"").unwrap();
        assert_eq!(user, UserId::new(80_351_110_224_678_912));
        assert_eq!(
            serde_json::to_string(&user).unwrap(),
            "\"80351110224678912\""
        );
    }

    #[test]
    fn test_id_ordering() {
        let a = ChannelId::new(1);
        let b = ChannelId::new(2);
        assert!(a < b);
        assert_eq!(a, ChannelId::from(Snowflake::new(1)));
    }
}
