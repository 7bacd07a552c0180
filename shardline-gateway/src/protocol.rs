//! Gateway wire protocol.
//!
//! Every frame is a JSON object `{ "op": u8, "d": any, "s": u64?, "t": str? }`.
//! `s` and `t` are only set on dispatches (op 0).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shardline_core::{GuildId, UserId};

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched.
    Dispatch = 0,
    /// Heartbeat, sent by us on a timer or requested by the remote.
    Heartbeat = 1,
    /// Start a new session.
    Identify = 2,
    /// Update the client's presence.
    PresenceUpdate = 3,
    /// Resume a previous session.
    Resume = 6,
    /// The remote asks us to reconnect and resume.
    Reconnect = 7,
    /// Request members of a guild.
    RequestGuildMembers = 8,
    /// The session was invalidated.
    InvalidSession = 9,
    /// First frame after connecting, carries the heartbeat interval.
    Hello = 10,
    /// A heartbeat was acknowledged.
    HeartbeatAck = 11,
}

impl OpCode {
    /// Returns the opcode for a raw value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self as u8
    }
}

/// Gateway intent bits.
pub mod intents {
    /// Guild lifecycle, channels and roles.
    pub const GUILDS: u64 = 1 << 0;
    /// Member add, update and remove. Privileged.
    pub const GUILD_MEMBERS: u64 = 1 << 1;
    /// Presence updates. Privileged.
    pub const GUILD_PRESENCES: u64 = 1 << 8;
    /// Guild messages.
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    /// Direct messages.
    pub const DIRECT_MESSAGES: u64 = 1 << 12;
    /// Message content. Privileged.
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    /// Intents that need no approval.
    pub const NON_PRIVILEGED: u64 = GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES;
}

/// A gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Opcode.
    pub op: u8,
    /// Payload.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (dispatches only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Dispatch name (dispatches only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Identify properties describing the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProperties {
    /// Operating system.
    pub os: String,
    /// Library name.
    pub browser: String,
    /// Library name.
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "shardline".to_string(),
            device: "shardline".to_string(),
        }
    }
}

/// Identify payload fields.
#[derive(Debug, Clone, Serialize)]
pub struct Identify<'a> {
    /// Bot token.
    pub token: &'a str,
    /// `[index, count]`.
    pub shard: [u32; 2],
    /// Intent bits.
    pub intents: u64,
    /// Client description.
    pub properties: &'a ConnectionProperties,
    /// Member count above which offline members are not sent.
    pub large_threshold: u32,
    /// Initial presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<&'a Value>,
}

impl GatewayFrame {
    /// Creates a frame with no sequence or name.
    #[must_use]
    pub const fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op as u8,
            d,
            s: None,
            t: None,
        }
    }

    /// Creates a dispatch frame.
    #[must_use]
    pub fn dispatch(seq: u64, name: impl Into<String>, d: Value) -> Self {
        Self {
            op: OpCode::Dispatch.get(),
            d,
            s: Some(seq),
            t: Some(name.into()),
        }
    }

    /// Heartbeat carrying the last sequence seen.
    #[must_use]
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, seq.map_or(Value::Null, Value::from))
    }

    /// Identify.
    #[must_use]
    pub fn identify(identify: &Identify<'_>) -> Self {
        Self::new(OpCode::Identify, json!(identify))
    }

    /// Resume.
    #[must_use]
    pub fn resume(token: &str, session_id: &str, seq: u64) -> Self {
        Self::new(
            OpCode::Resume,
            json!({ "token": token, "session_id": session_id, "seq": seq }),
        )
    }

    /// Hello announcing `interval`.
    #[must_use]
    pub fn hello(interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self::new(OpCode::Hello, json!({ "heartbeat_interval": millis }))
    }

    /// Invalid session.
    #[must_use]
    pub const fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    /// Returns the opcode, if known.
    #[must_use]
    pub const fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.op)
    }

    /// Returns the heartbeat interval of a Hello frame.
    #[must_use]
    pub fn hello_interval(&self) -> Option<Duration> {
        self.d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Parses a frame from text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outbound commands an application may send on a shard.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    /// Change the client's presence.
    UpdatePresence {
        /// `online`, `idle`, `dnd` or `invisible`.
        status: String,
        /// Activity objects.
        activities: Vec<Value>,
        /// AFK flag.
        afk: bool,
        /// Idle-since time in ms.
        since: Option<u64>,
    },
    /// Ask for members of a guild; answered with member chunks.
    RequestGuildMembers {
        /// Guild.
        guild_id: GuildId,
        /// Username prefix, empty for all.
        query: Option<String>,
        /// Maximum members, 0 for no limit.
        limit: u32,
        /// Specific users instead of a query.
        user_ids: Vec<UserId>,
        /// Include presences.
        presences: bool,
        /// Echoed back in the chunks.
        nonce: Option<String>,
    },
}

impl GatewayCommand {
    /// Converts the command to a frame.
    #[must_use]
    pub fn to_frame(&self) -> GatewayFrame {
        match self {
            Self::UpdatePresence {
                status,
                activities,
                afk,
                since,
            } => GatewayFrame::new(
                OpCode::PresenceUpdate,
                json!({ "status": status, "activities": activities, "afk": afk, "since": since }),
            ),
            Self::RequestGuildMembers {
                guild_id,
                query,
                limit,
                user_ids,
                presences,
                nonce,
            } => {
                let mut d = json!({
                    "guild_id": guild_id,
                    "limit": limit,
                    "presences": presences,
                });
                if user_ids.is_empty() {
                    d["query"] = json!(query.as_deref().unwrap_or(""));
                } else {
                    d["user_ids"] = json!(user_ids);
                }
                if let Some(nonce) = nonce {
                    d["nonce"] = json!(nonce);
                }
                GatewayFrame::new(OpCode::RequestGuildMembers, d)
            }
        }
    }
}

/// What a close code means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect and resume.
    Resume,
    /// Reconnect with a fresh identify.
    Reidentify,
    /// Do not reconnect.
    Fatal(&'static str),
}

/// Classifies a close code sent by the remote.
#[must_use]
pub const fn close_action(code: u16) -> CloseAction {
    match code {
        4004 => CloseAction::Fatal("authentication failed"),
        4010 => CloseAction::Fatal("invalid shard"),
        4011 => CloseAction::Fatal("sharding required"),
        4012 => CloseAction::Fatal("invalid API version"),
        4013 => CloseAction::Fatal("invalid intents"),
        4014 => CloseAction::Fatal("disallowed intents"),
        4007 | 4009 => CloseAction::Reidentify,
        _ => CloseAction::Resume,
    }
}

/// Close code for a deliberate shutdown. The remote ends the session.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when we drop a connection but want to resume later.
pub const CLOSE_RESUMABLE: u16 = 4000;
