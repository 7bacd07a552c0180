//! Cached entity kinds, their field sets, and partial patches.
//!
//! Each entity kind has a plain snapshot struct and a patch struct whose
//! fields are all optional. A patch only touches the fields it carries.
//! Nullable fields use `Option<Option<T>>` in patches so a patch can clear
//! them (`Some(None)`) as well as leave them alone (`None`).

use std::fmt;

use serde::{Deserialize, Serialize};
use shardline_core::{ChannelId, GuildId, RoleId, Snowflake, UserId};

/// The closed set of entity kinds the cache stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A guild.
    Guild,
    /// A channel, inside a guild or direct.
    Channel,
    /// A guild role.
    Role,
    /// A user's membership in a guild.
    Member,
    /// A user account.
    User,
    /// A user's presence in a guild.
    Presence,
}

impl EntityKind {
    /// Every kind.
    pub const ALL: [Self; 6] = [
        Self::Guild,
        Self::Channel,
        Self::Role,
        Self::Member,
        Self::User,
        Self::Presence,
    ];

    /// Returns the kind's lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Member => "member",
            Self::User => "user",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    /// Guild id.
    pub id: GuildId,
    /// Display name.
    pub name: String,
    /// Owner.
    pub owner_id: UserId,
    /// Icon hash.
    pub icon: Option<String>,
    /// Approximate member count.
    pub member_count: Option<u64>,
    /// True while the guild is in an outage.
    pub unavailable: bool,
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel id.
    pub id: ChannelId,
    /// Owning guild, `None` for direct channels.
    pub guild_id: Option<GuildId>,
    /// Numeric channel type.
    pub kind: u8,
    /// Name.
    pub name: Option<String>,
    /// Sort position.
    pub position: Option<i32>,
    /// Topic.
    pub topic: Option<String>,
    /// Parent category.
    pub parent_id: Option<ChannelId>,
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Role id.
    pub id: RoleId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// Name.
    pub name: String,
    /// RGB color.
    pub color: u32,
    /// Sort position.
    pub position: i32,
    /// Permission bit set.
    pub permissions: u64,
    /// Shown separately in the member list.
    pub hoist: bool,
    /// Mentionable by everyone.
    pub mentionable: bool,
}

/// A user's membership in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Guild.
    pub guild_id: GuildId,
    /// User.
    pub user_id: UserId,
    /// Guild nickname.
    pub nick: Option<String>,
    /// Assigned roles.
    pub roles: Vec<RoleId>,
    /// Join time as sent by the remote (ISO 8601).
    pub joined_at: Option<String>,
    /// Has not yet passed membership screening.
    pub pending: bool,
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Unique username.
    pub username: String,
    /// Display name.
    pub global_name: Option<String>,
    /// Avatar hash.
    pub avatar: Option<String>,
    /// Bot account.
    pub bot: bool,
}

/// A user's presence in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Guild.
    pub guild_id: GuildId,
    /// User.
    pub user_id: UserId,
    /// Status (`online`, `idle`, `dnd`, `offline`).
    pub status: String,
    /// Names of current activities.
    pub activities: Vec<String>,
}

/// A cached entity of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A guild.
    Guild(Guild),
    /// A channel.
    Channel(Channel),
    /// A role.
    Role(Role),
    /// A member.
    Member(Member),
    /// A user.
    User(User),
    /// A presence.
    Presence(Presence),
}

impl Entity {
    /// Returns the entity's kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Member(_) => EntityKind::Member,
            Self::User(_) => EntityKind::User,
            Self::Presence(_) => EntityKind::Presence,
        }
    }

    /// Returns the id the entity is keyed by.
    ///
    /// Members and presences are keyed by their user id.
    #[must_use]
    pub const fn id(&self) -> Snowflake {
        match self {
            Self::Guild(g) => g.id.snowflake(),
            Self::Channel(c) => c.id.snowflake(),
            Self::Role(r) => r.id.snowflake(),
            Self::Member(m) => m.user_id.snowflake(),
            Self::User(u) => u.id.snowflake(),
            Self::Presence(p) => p.user_id.snowflake(),
        }
    }

    /// Returns the guild the entity belongs to, if any.
    #[must_use]
    pub const fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::Guild(_) | Self::User(_) => None,
            Self::Channel(c) => c.guild_id,
            Self::Role(r) => Some(r.guild_id),
            Self::Member(m) => Some(m.guild_id),
            Self::Presence(p) => Some(p.guild_id),
        }
    }

    /// Returns the guild, if this is one.
    #[must_use]
    pub const fn as_guild(&self) -> Option<&Guild> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the channel, if this is one.
    #[must_use]
    pub const fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the role, if this is one.
    #[must_use]
    pub const fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the member, if this is one.
    #[must_use]
    pub const fn as_member(&self) -> Option<&Member> {
        match self {
            Self::Member(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the user, if this is one.
    #[must_use]
    pub const fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    /// Returns the presence, if this is one.
    #[must_use]
    pub const fn as_presence(&self) -> Option<&Presence> {
        match self {
            Self::Presence(p) => Some(p),
            _ => None,
        }
    }
}

/// Partial guild update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildPatch {
    /// New name.
    pub name: Option<String>,
    /// New owner.
    pub owner_id: Option<UserId>,
    /// New icon.
    pub icon: Option<Option<String>>,
    /// New member count.
    pub member_count: Option<u64>,
    /// New availability.
    pub unavailable: Option<bool>,
}

/// Partial channel update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPatch {
    /// New name.
    pub name: Option<Option<String>>,
    /// New position.
    pub position: Option<i32>,
    /// New topic.
    pub topic: Option<Option<String>>,
    /// New parent category.
    pub parent_id: Option<Option<ChannelId>>,
}

/// Partial role update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    /// New name.
    pub name: Option<String>,
    /// New color.
    pub color: Option<u32>,
    /// New position.
    pub position: Option<i32>,
    /// New permissions.
    pub permissions: Option<u64>,
    /// New hoist flag.
    pub hoist: Option<bool>,
    /// New mentionable flag.
    pub mentionable: Option<bool>,
}

/// Partial member update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPatch {
    /// New nickname.
    pub nick: Option<Option<String>>,
    /// New role set.
    pub roles: Option<Vec<RoleId>>,
    /// New screening state.
    pub pending: Option<bool>,
}

/// Partial user update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// New username.
    pub username: Option<String>,
    /// New display name.
    pub global_name: Option<Option<String>>,
    /// New avatar.
    pub avatar: Option<Option<String>>,
}

/// Partial presence update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresencePatch {
    /// New status.
    pub status: Option<String>,
    /// New activity list.
    pub activities: Option<Vec<String>>,
}

/// A partial update for any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Guild fields.
    Guild(GuildPatch),
    /// Channel fields.
    Channel(ChannelPatch),
    /// Role fields.
    Role(RolePatch),
    /// Member fields.
    Member(MemberPatch),
    /// User fields.
    User(UserPatch),
    /// Presence fields.
    Presence(PresencePatch),
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl Patch {
    /// Returns the kind this patch applies to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Member(_) => EntityKind::Member,
            Self::User(_) => EntityKind::User,
            Self::Presence(_) => EntityKind::Presence,
        }
    }

    /// Merges the patch onto `entity`.
    ///
    /// Returns false, leaving `entity` untouched, if the kinds differ.
    pub fn merge_into(self, entity: &mut Entity) -> bool {
        match (self, entity) {
            (Self::Guild(p), Entity::Guild(g)) => {
                set(&mut g.name, p.name);
                set(&mut g.owner_id, p.owner_id);
                set(&mut g.icon, p.icon);
                if p.member_count.is_some() {
                    g.member_count = p.member_count;
                }
                set(&mut g.unavailable, p.unavailable);
            }
            (Self::Channel(p), Entity::Channel(c)) => {
                set(&mut c.name, p.name);
                if p.position.is_some() {
                    c.position = p.position;
                }
                set(&mut c.topic, p.topic);
                set(&mut c.parent_id, p.parent_id);
            }
            (Self::Role(p), Entity::Role(r)) => {
                set(&mut r.name, p.name);
                set(&mut r.color, p.color);
                set(&mut r.position, p.position);
                set(&mut r.permissions, p.permissions);
                set(&mut r.hoist, p.hoist);
                set(&mut r.mentionable, p.mentionable);
            }
            (Self::Member(p), Entity::Member(m)) => {
                set(&mut m.nick, p.nick);
                set(&mut m.roles, p.roles);
                set(&mut m.pending, p.pending);
            }
            (Self::User(p), Entity::User(u)) => {
                set(&mut u.username, p.username);
                set(&mut u.global_name, p.global_name);
                set(&mut u.avatar, p.avatar);
            }
            (Self::Presence(p), Entity::Presence(pr)) => {
                set(&mut pr.status, p.status);
                set(&mut pr.activities, p.activities);
            }
            _ => return false,
        }
        true
    }
}
