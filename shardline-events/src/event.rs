//! Typed gateway events.

use std::fmt;

use shardline_cache::{Channel, Guild, Member, Role, User};
use shardline_core::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// Session details from a Ready dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    /// Session id for later resumes.
    pub session_id: String,
    /// Dedicated URL for resuming this session.
    pub resume_gateway_url: Option<String>,
    /// The connected account.
    pub user: User,
    /// Guilds the shard will deliver, all initially unavailable.
    pub guilds: Vec<GuildId>,
    /// `[index, count]` echoed back by the remote.
    pub shard: Option<[u32; 2]>,
}

/// A created message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Channel.
    pub channel_id: ChannelId,
    /// Guild, for guild channels.
    pub guild_id: Option<GuildId>,
    /// Author.
    pub author: User,
    /// Text content.
    pub content: String,
}

/// A decoded gateway event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new session was established.
    Ready(Box<Ready>),
    /// A session was resumed and missed events replayed.
    Resumed,
    /// A fresh session replaced a lost one; cached guilds of the shard were
    /// marked stale until their snapshots arrive again.
    Resynchronized {
        /// Guild partitions marked stale.
        stale_guilds: usize,
    },
    /// Bulk snapshot of a guild.
    GuildCreate {
        /// The guild.
        guild: Guild,
        /// Channels in the snapshot.
        channels: usize,
        /// Members in the snapshot.
        members: usize,
    },
    /// Some guild fields changed.
    GuildUpdate {
        /// The guild.
        guild_id: GuildId,
    },
    /// A guild was left or went into an outage.
    GuildDelete {
        /// The guild.
        guild_id: GuildId,
        /// True for an outage, false when the guild is gone.
        unavailable: bool,
    },
    /// A channel was created.
    ChannelCreate(Channel),
    /// A channel changed.
    ChannelUpdate(Channel),
    /// A channel was deleted.
    ChannelDelete(Channel),
    /// A role was created.
    RoleCreate(Role),
    /// A role changed.
    RoleUpdate(Role),
    /// A role was deleted.
    RoleDelete {
        /// The guild.
        guild_id: GuildId,
        /// The role.
        role_id: RoleId,
    },
    /// A user joined a guild.
    MemberAdd(Member),
    /// Some member fields changed.
    MemberUpdate {
        /// The guild.
        guild_id: GuildId,
        /// The member.
        user_id: UserId,
    },
    /// A user left a guild.
    MemberRemove {
        /// The guild.
        guild_id: GuildId,
        /// The user.
        user: User,
    },
    /// One chunk of a member request.
    MembersChunk {
        /// The guild.
        guild_id: GuildId,
        /// Members in this chunk.
        members: Vec<UserId>,
        /// Zero-based chunk index.
        chunk_index: u32,
        /// Total chunks.
        chunk_count: u32,
        /// Nonce from the request.
        nonce: Option<String>,
    },
    /// A presence changed.
    PresenceUpdate {
        /// The guild.
        guild_id: GuildId,
        /// The user.
        user_id: UserId,
        /// New status, if sent.
        status: Option<String>,
    },
    /// The connected account changed.
    UserUpdate(User),
    /// A message was sent.
    MessageCreate(Box<Message>),
    /// A dispatch this crate does not model.
    Unknown {
        /// Dispatch name.
        name: String,
        /// Raw payload.
        data: serde_json::Value,
    },
}

/// Field-less mirror of [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum EventKind {
    Ready,
    Resumed,
    Resynchronized,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    MemberAdd,
    MemberUpdate,
    MemberRemove,
    MembersChunk,
    PresenceUpdate,
    UserUpdate,
    MessageCreate,
    Unknown,
}

impl EventKind {
    /// Returns the dispatch name the kind is decoded from.
    ///
    /// `Resynchronized` is produced locally and has no dispatch name of its
    /// own; `Unknown` covers every unmodelled name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::Resynchronized => "RESYNCHRONIZED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::RoleCreate => "GUILD_ROLE_CREATE",
            Self::RoleUpdate => "GUILD_ROLE_UPDATE",
            Self::RoleDelete => "GUILD_ROLE_DELETE",
            Self::MemberAdd => "GUILD_MEMBER_ADD",
            Self::MemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::MemberRemove => "GUILD_MEMBER_REMOVE",
            Self::MembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::UserUpdate => "USER_UPDATE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Event {
    /// Returns the event's kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Ready(_) => EventKind::Ready,
            Self::Resumed => EventKind::Resumed,
            Self::Resynchronized { .. } => EventKind::Resynchronized,
            Self::GuildCreate { .. } => EventKind::GuildCreate,
            Self::GuildUpdate { .. } => EventKind::GuildUpdate,
            Self::GuildDelete { .. } => EventKind::GuildDelete,
            Self::ChannelCreate(_) => EventKind::ChannelCreate,
            Self::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Self::ChannelDelete(_) => EventKind::ChannelDelete,
            Self::RoleCreate(_) => EventKind::RoleCreate,
            Self::RoleUpdate(_) => EventKind::RoleUpdate,
            Self::RoleDelete { .. } => EventKind::RoleDelete,
            Self::MemberAdd(_) => EventKind::MemberAdd,
            Self::MemberUpdate { .. } => EventKind::MemberUpdate,
            Self::MemberRemove { .. } => EventKind::MemberRemove,
            Self::MembersChunk { .. } => EventKind::MembersChunk,
            Self::PresenceUpdate { .. } => EventKind::PresenceUpdate,
            Self::UserUpdate(_) => EventKind::UserUpdate,
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Returns the guild the event concerns, if any.
    #[must_use]
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::GuildCreate { guild, .. } => Some(guild.id),
            Self::GuildUpdate { guild_id }
            | Self::GuildDelete { guild_id, .. }
            | Self::RoleDelete { guild_id, .. }
            | Self::MemberUpdate { guild_id, .. }
            | Self::MemberRemove { guild_id, .. }
            | Self::MembersChunk { guild_id, .. }
            | Self::PresenceUpdate { guild_id, .. } => Some(*guild_id),
            Self::ChannelCreate(c) | Self::ChannelUpdate(c) | Self::ChannelDelete(c) => c.guild_id,
            Self::RoleCreate(r) | Self::RoleUpdate(r) => Some(r.guild_id),
            Self::MemberAdd(m) => Some(m.guild_id),
            Self::MessageCreate(m) => m.guild_id,
            Self::Ready(_)
            | Self::Resumed
            | Self::Resynchronized { .. }
            | Self::UserUpdate(_)
            | Self::Unknown { .. } => None,
        }
    }
}

/// An event as delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Shard the event arrived on.
    pub shard: u32,
    /// Gateway sequence number, for dispatched events.
    pub seq: Option<u64>,
    /// The event.
    pub event: Event,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(shard: u32, seq: Option<u64>, event: Event) -> Self {
        Self { shard, seq, event }
    }

    /// Returns the event's kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
