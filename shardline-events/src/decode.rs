//! Dispatch decoding.
//!
//! [`decode`] maps a dispatch name and JSON payload to an [`Event`] and the
//! cache writes the event implies. It touches no shared state, so the same
//! frame always decodes to the same result.

use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use serde_json::{Map, Value};
use shardline_cache::{
    CacheKey, CacheOp, CachePatch, Channel, Entity, Guild, GuildPatch, Member, MemberPatch, Patch,
    Presence, PresencePatch, Role, User,
};
use shardline_core::{ChannelId, GuildId, MessageId, RoleId, UserId};

use crate::error::{DecodeError, DecodeResult};
use crate::event::{Envelope, Event, Message, Ready};

/// A dispatch (op 0) frame as received from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFrame {
    /// Sequence number.
    pub seq: u64,
    /// Dispatch name (the frame's `t`).
    pub name: String,
    /// Payload (the frame's `d`).
    pub data: Value,
}

impl DispatchFrame {
    /// Creates a frame.
    pub fn new(seq: u64, name: impl Into<String>, data: Value) -> Self {
        Self {
            seq,
            name: name.into(),
            data,
        }
    }
}

/// The result of decoding one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The event, tagged with its shard and sequence.
    pub envelope: Envelope,
    /// Cache writes to apply before the event is published.
    pub patch: CachePatch,
}

/// Decodes a dispatch frame received on `shard`.
///
/// Unknown dispatch names decode to [`Event::Unknown`] with no cache writes.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if a known dispatch has a payload of
/// the wrong shape.
pub fn decode(shard: u32, frame: &DispatchFrame) -> DecodeResult<Decoded> {
    let data = &frame.data;
    let decoded = match frame.name.as_str() {
        "READY" => ready(data),
        "RESUMED" => Ok((Event::Resumed, CachePatch::new())),
        "GUILD_CREATE" => guild_create(data),
        "GUILD_UPDATE" => guild_update(data),
        "GUILD_DELETE" => guild_delete(data),
        "CHANNEL_CREATE" => channel_upsert(data).map(|(c, p)| (Event::ChannelCreate(c), p)),
        "CHANNEL_UPDATE" => channel_upsert(data).map(|(c, p)| (Event::ChannelUpdate(c), p)),
        "CHANNEL_DELETE" => channel_delete(data),
        "GUILD_ROLE_CREATE" => role_upsert(data).map(|(r, p)| (Event::RoleCreate(r), p)),
        "GUILD_ROLE_UPDATE" => role_upsert(data).map(|(r, p)| (Event::RoleUpdate(r), p)),
        "GUILD_ROLE_DELETE" => role_delete(data),
        "GUILD_MEMBER_ADD" => member_add(data),
        "GUILD_MEMBER_UPDATE" => member_update(data),
        "GUILD_MEMBER_REMOVE" => member_remove(data),
        "GUILD_MEMBERS_CHUNK" => members_chunk(data),
        "PRESENCE_UPDATE" => presence_update(data),
        "USER_UPDATE" => user_update(data),
        "MESSAGE_CREATE" => message_create(data),
        name => Ok((
            Event::Unknown {
                name: name.to_string(),
                data: data.clone(),
            },
            CachePatch::new(),
        )),
    };

    let (event, patch) = decoded.map_err(|e| DecodeError::malformed(&frame.name, e))?;
    Ok(Decoded {
        envelope: Envelope::new(shard, Some(frame.seq), event),
        patch,
    })
}

/// Decodes a user object, as returned by the REST API.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the payload is not a user.
pub fn decode_user(data: &Value) -> DecodeResult<User> {
    parse::<WireUser>(data)
        .map(User::from)
        .map_err(|e| DecodeError::malformed("user", e))
}

/// Decodes a guild member object and its embedded user.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the payload is not a member or has
/// no user.
pub fn decode_member(guild_id: GuildId, data: &Value) -> DecodeResult<(Member, User)> {
    parse::<WireMember>(data)
        .and_then(|m| m.into_entities(guild_id))
        .map_err(|e| DecodeError::malformed("member", e))
}

/// Decodes a channel object.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the payload is not a channel.
pub fn decode_channel(data: &Value) -> DecodeResult<Channel> {
    parse::<WireChannel>(data)
        .map(|c| c.into_channel(None))
        .map_err(|e| DecodeError::malformed("channel", e))
}

type Step<T> = serde_json::Result<T>;

#[derive(Deserialize)]
struct WireUser {
    id: UserId,
    #[serde(default)]
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl From<WireUser> for User {
    fn from(w: WireUser) -> Self {
        Self {
            id: w.id,
            username: w.username,
            global_name: w.global_name,
            avatar: w.avatar,
            bot: w.bot,
        }
    }
}

#[derive(Deserialize)]
struct WireUserRef {
    id: UserId,
}

#[derive(Deserialize)]
struct WireChannel {
    id: ChannelId,
    #[serde(rename = "type", default)]
    kind: u8,
    guild_id: Option<GuildId>,
    name: Option<String>,
    position: Option<i32>,
    topic: Option<String>,
    parent_id: Option<ChannelId>,
}

impl WireChannel {
    fn into_channel(self, guild: Option<GuildId>) -> Channel {
        Channel {
            id: self.id,
            guild_id: self.guild_id.or(guild),
            kind: self.kind,
            name: self.name,
            position: self.position,
            topic: self.topic,
            parent_id: self.parent_id,
        }
    }
}

#[derive(Deserialize)]
struct WireRole {
    id: RoleId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: u32,
    #[serde(default)]
    position: i32,
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default)]
    hoist: bool,
    #[serde(default)]
    mentionable: bool,
}

impl WireRole {
    fn into_role(self, guild_id: GuildId) -> Step<Role> {
        let permissions = match self.permissions.as_deref() {
            None => 0,
            Some(bits) => bits
                .parse()
                .map_err(|_| serde_json::Error::custom("permissions is not a decimal u64"))?,
        };
        Ok(Role {
            id: self.id,
            guild_id,
            name: self.name,
            color: self.color,
            position: self.position,
            permissions,
            hoist: self.hoist,
            mentionable: self.mentionable,
        })
    }
}

#[derive(Deserialize)]
struct WireMember {
    user: Option<WireUser>,
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<RoleId>,
    joined_at: Option<String>,
    #[serde(default)]
    pending: bool,
    guild_id: Option<GuildId>,
}

impl WireMember {
    fn into_entities(self, guild: GuildId) -> Step<(Member, User)> {
        let user: User = self
            .user
            .ok_or_else(|| serde_json::Error::missing_field("user"))?
            .into();
        let member = Member {
            guild_id: self.guild_id.unwrap_or(guild),
            user_id: user.id,
            nick: self.nick,
            roles: self.roles,
            joined_at: self.joined_at,
            pending: self.pending,
        };
        Ok((member, user))
    }
}

#[derive(Deserialize)]
struct WireActivity {
    name: String,
}

#[derive(Deserialize)]
struct WirePresence {
    user: WireUserRef,
    guild_id: Option<GuildId>,
    status: Option<String>,
    activities: Option<Vec<WireActivity>>,
}

impl WirePresence {
    fn into_presence(self, guild: GuildId) -> Presence {
        Presence {
            guild_id: self.guild_id.unwrap_or(guild),
            user_id: self.user.id,
            status: self.status.unwrap_or_else(|| "offline".to_string()),
            activities: self
                .activities
                .unwrap_or_default()
                .into_iter()
                .map(|a| a.name)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireGuild {
    id: GuildId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner_id: UserId,
    icon: Option<String>,
    member_count: Option<u64>,
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    channels: Vec<WireChannel>,
    #[serde(default)]
    roles: Vec<WireRole>,
    #[serde(default)]
    members: Vec<WireMember>,
    #[serde(default)]
    presences: Vec<WirePresence>,
}

#[derive(Deserialize)]
struct WireUnavailableGuild {
    id: GuildId,
    #[serde(default)]
    unavailable: bool,
}

fn parse<T: DeserializeOwned>(data: &Value) -> Step<T> {
    T::deserialize(data)
}

fn object(data: &Value) -> Step<&Map<String, Value>> {
    data.as_object()
        .ok_or_else(|| serde_json::Error::custom("expected an object"))
}

fn required<T: DeserializeOwned>(obj: &Map<String, Value>, field: &'static str) -> Step<T> {
    obj.get(field)
        .ok_or_else(|| serde_json::Error::missing_field(field))
        .and_then(T::deserialize)
}

/// Absent and null both read as "not sent".
fn optional<T: DeserializeOwned>(obj: &Map<String, Value>, field: &str) -> Step<Option<T>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => T::deserialize(v).map(Some),
    }
}

/// Absent reads as "unchanged", null as "cleared".
fn nullable<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    field: &str,
) -> Step<Option<Option<T>>> {
    match obj.get(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => T::deserialize(v).map(|t| Some(Some(t))),
    }
}

fn ready(data: &Value) -> Step<(Event, CachePatch)> {
    #[derive(Deserialize)]
    struct WireReady {
        session_id: String,
        resume_gateway_url: Option<String>,
        user: WireUser,
        #[serde(default)]
        guilds: Vec<WireUnavailableGuild>,
        shard: Option<[u32; 2]>,
    }

    let wire: WireReady = parse(data)?;
    let user: User = wire.user.into();
    let patch = CachePatch::new().with(CacheOp::SetSelfUser(user.clone()));
    let ready = Ready {
        session_id: wire.session_id,
        resume_gateway_url: wire.resume_gateway_url,
        user,
        guilds: wire.guilds.into_iter().map(|g| g.id).collect(),
        shard: wire.shard,
    };
    Ok((Event::Ready(Box::new(ready)), patch))
}

fn guild_create(data: &Value) -> Step<(Event, CachePatch)> {
    let wire: WireGuild = parse(data)?;
    let guild_id = wire.id;
    let guild = Guild {
        id: guild_id,
        name: wire.name,
        owner_id: wire.owner_id,
        icon: wire.icon,
        member_count: wire.member_count,
        unavailable: wire.unavailable,
    };

    if wire.unavailable {
        let mut patch = CachePatch::new();
        patch.merge(
            CacheKey::guild(guild_id),
            Patch::Guild(GuildPatch {
                unavailable: Some(true),
                ..GuildPatch::default()
            }),
        );
        let event = Event::GuildCreate {
            guild,
            channels: 0,
            members: 0,
        };
        return Ok((event, patch));
    }

    let channels = wire.channels.len();
    let members = wire.members.len();
    let mut children = Vec::with_capacity(channels + members * 2 + wire.roles.len());

    for channel in wire.channels {
        children.push(Entity::Channel(channel.into_channel(Some(guild_id))));
    }
    for role in wire.roles {
        children.push(Entity::Role(role.into_role(guild_id)?));
    }
    for member in wire.members {
        let (member, user) = member.into_entities(guild_id)?;
        children.push(Entity::User(user));
        children.push(Entity::Member(member));
    }
    for presence in wire.presences {
        children.push(Entity::Presence(presence.into_presence(guild_id)));
    }

    let patch = CachePatch::new().with(CacheOp::Snapshot {
        guild: guild.clone(),
        children,
    });
    let event = Event::GuildCreate {
        guild,
        channels,
        members,
    };
    Ok((event, patch))
}

fn guild_update(data: &Value) -> Step<(Event, CachePatch)> {
    let obj = object(data)?;
    let guild_id: GuildId = required(obj, "id")?;
    let fields = GuildPatch {
        name: optional(obj, "name")?,
        owner_id: optional(obj, "owner_id")?,
        icon: nullable(obj, "icon")?,
        member_count: optional(obj, "member_count")?,
        unavailable: optional(obj, "unavailable")?,
    };

    let mut patch = CachePatch::new();
    patch.merge(CacheKey::guild(guild_id), Patch::Guild(fields));
    Ok((Event::GuildUpdate { guild_id }, patch))
}

fn guild_delete(data: &Value) -> Step<(Event, CachePatch)> {
    let wire: WireUnavailableGuild = parse(data)?;
    let key = CacheKey::guild(wire.id);

    let mut patch = CachePatch::new();
    if wire.unavailable {
        patch.merge(
            key,
            Patch::Guild(GuildPatch {
                unavailable: Some(true),
                ..GuildPatch::default()
            }),
        );
    } else {
        patch.remove(key);
    }
    let event = Event::GuildDelete {
        guild_id: wire.id,
        unavailable: wire.unavailable,
    };
    Ok((event, patch))
}

fn channel_upsert(data: &Value) -> Step<(Channel, CachePatch)> {
    let channel = parse::<WireChannel>(data)?.into_channel(None);
    let mut patch = CachePatch::new();
    patch.replace(Entity::Channel(channel.clone()));
    Ok((channel, patch))
}

fn channel_delete(data: &Value) -> Step<(Event, CachePatch)> {
    let channel = parse::<WireChannel>(data)?.into_channel(None);
    let mut patch = CachePatch::new();
    patch.remove(CacheKey::channel(channel.guild_id, channel.id));
    Ok((Event::ChannelDelete(channel), patch))
}

fn role_upsert(data: &Value) -> Step<(Role, CachePatch)> {
    #[derive(Deserialize)]
    struct WireRoleEvent {
        guild_id: GuildId,
        role: WireRole,
    }

    let wire: WireRoleEvent = parse(data)?;
    let role = wire.role.into_role(wire.guild_id)?;
    let mut patch = CachePatch::new();
    patch.replace(Entity::Role(role.clone()));
    Ok((role, patch))
}

fn role_delete(data: &Value) -> Step<(Event, CachePatch)> {
    let obj = object(data)?;
    let guild_id: GuildId = required(obj, "guild_id")?;
    let role_id: RoleId = required(obj, "role_id")?;
    let mut patch = CachePatch::new();
    patch.remove(CacheKey::role(guild_id, role_id));
    Ok((Event::RoleDelete { guild_id, role_id }, patch))
}

fn member_add(data: &Value) -> Step<(Event, CachePatch)> {
    let wire: WireMember = parse(data)?;
    let guild_id = wire
        .guild_id
        .ok_or_else(|| serde_json::Error::missing_field("guild_id"))?;
    let (member, user) = wire.into_entities(guild_id)?;

    let mut patch = CachePatch::new();
    patch.replace(Entity::User(user));
    patch.replace(Entity::Member(member.clone()));
    Ok((Event::MemberAdd(member), patch))
}

fn member_update(data: &Value) -> Step<(Event, CachePatch)> {
    let obj = object(data)?;
    let guild_id: GuildId = required(obj, "guild_id")?;
    let user: WireUser = required(obj, "user")?;
    let user_id = user.id;
    let fields = MemberPatch {
        nick: nullable(obj, "nick")?,
        roles: optional(obj, "roles")?,
        pending: optional(obj, "pending")?,
    };

    let mut patch = CachePatch::new();
    patch.replace(Entity::User(user.into()));
    patch.merge(CacheKey::member(guild_id, user_id), Patch::Member(fields));
    Ok((Event::MemberUpdate { guild_id, user_id }, patch))
}

fn member_remove(data: &Value) -> Step<(Event, CachePatch)> {
    let obj = object(data)?;
    let guild_id: GuildId = required(obj, "guild_id")?;
    let user: User = required::<WireUser>(obj, "user")?.into();

    let mut patch = CachePatch::new();
    patch.remove(CacheKey::member(guild_id, user.id));
    patch.remove(CacheKey::presence(guild_id, user.id));
    Ok((Event::MemberRemove { guild_id, user }, patch))
}

fn members_chunk(data: &Value) -> Step<(Event, CachePatch)> {
    #[derive(Deserialize)]
    struct WireChunk {
        guild_id: GuildId,
        members: Vec<WireMember>,
        #[serde(default)]
        chunk_index: u32,
        #[serde(default)]
        chunk_count: u32,
        nonce: Option<String>,
        #[serde(default)]
        presences: Vec<WirePresence>,
    }

    let wire: WireChunk = parse(data)?;
    let guild_id = wire.guild_id;
    let mut patch = CachePatch::new();
    let mut members = Vec::with_capacity(wire.members.len());

    for member in wire.members {
        let (member, user) = member.into_entities(guild_id)?;
        members.push(member.user_id);
        patch.replace(Entity::User(user));
        patch.replace(Entity::Member(member));
    }
    for presence in wire.presences {
        patch.replace(Entity::Presence(presence.into_presence(guild_id)));
    }

    let event = Event::MembersChunk {
        guild_id,
        members,
        chunk_index: wire.chunk_index,
        chunk_count: wire.chunk_count,
        nonce: wire.nonce,
    };
    Ok((event, patch))
}

fn presence_update(data: &Value) -> Step<(Event, CachePatch)> {
    let obj = object(data)?;
    let guild_id: GuildId = required(obj, "guild_id")?;
    let user: WireUserRef = required(obj, "user")?;
    let status: Option<String> = optional(obj, "status")?;
    let activities: Option<Vec<WireActivity>> = optional(obj, "activities")?;

    let fields = PresencePatch {
        status: status.clone(),
        activities: activities.map(|list| list.into_iter().map(|a| a.name).collect()),
    };
    let mut patch = CachePatch::new();
    patch.merge(CacheKey::presence(guild_id, user.id), Patch::Presence(fields));

    let event = Event::PresenceUpdate {
        guild_id,
        user_id: user.id,
        status,
    };
    Ok((event, patch))
}

fn user_update(data: &Value) -> Step<(Event, CachePatch)> {
    let user: User = parse::<WireUser>(data)?.into();
    let patch = CachePatch::new().with(CacheOp::SetSelfUser(user.clone()));
    Ok((Event::UserUpdate(user), patch))
}

fn message_create(data: &Value) -> Step<(Event, CachePatch)> {
    #[derive(Deserialize)]
    struct WireMessage {
        id: MessageId,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
        author: WireUser,
        #[serde(default)]
        content: String,
    }

    let wire: WireMessage = parse(data)?;
    let message = Message {
        id: wire.id,
        channel_id: wire.channel_id,
        guild_id: wire.guild_id,
        author: wire.author.into(),
        content: wire.content,
    };
    Ok((Event::MessageCreate(Box::new(message)), CachePatch::new()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shardline_cache::{EntityCache, EntityKind, Update};

    use super::*;
    use crate::event::EventKind;

    fn frame(name: &str, data: Value) -> DispatchFrame {
        DispatchFrame::new(1, name, data)
    }

    fn guild_payload() -> Value {
        json!({
            "id": "100",
            "name": "rustaceans",
            "owner_id": "1",
            "channels": [{ "id": "200", "type": 0, "name": "general" }],
            "roles": [{ "id": "300", "name": "mod", "permissions": "8" }],
            "members": [
                { "user": { "id": "1", "username": "a" }, "roles": ["300"] },
                { "user": { "id": "2", "username": "b" }, "nick": "bee" }
            ],
            "presences": [{ "user": { "id": "1" }, "status": "online" }]
        })
    }

    #[test]
    fn test_ready_sets_self_user() {
        let decoded = decode(
            3,
            &frame(
                "READY",
                json!({
                    "v": 10,
                    "session_id": "abc",
                    "resume_gateway_url": "wss://resume.example",
                    "user": { "id": "9", "username": "bot", "bot": true },
                    "guilds": [{ "id": "100", "unavailable": true }],
                    "shard": [3, 4]
                }),
            ),
        )
        .unwrap();

        assert_eq!(decoded.envelope.shard, 3);
        let Event::Ready(ready) = &decoded.envelope.event else {
            panic!("expected Ready");
        };
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.guilds, vec![GuildId::new(100)]);
        assert_eq!(ready.shard, Some([3, 4]));
        assert!(matches!(decoded.patch.ops(), [CacheOp::SetSelfUser(u)] if u.bot));
    }

    #[test]
    fn test_guild_create_is_bulk_snapshot() {
        let decoded = decode(0, &frame("GUILD_CREATE", guild_payload())).unwrap();
        assert_eq!(decoded.envelope.kind(), EventKind::GuildCreate);

        let cache = EntityCache::default();
        assert!(cache.apply(decoded.patch).is_empty());

        let g = GuildId::new(100);
        let member = cache.get(&CacheKey::member(g, UserId::new(2))).unwrap();
        assert_eq!(member.entity.as_member().unwrap().nick.as_deref(), Some("bee"));
        let channel = cache
            .get(&CacheKey::channel(Some(g), ChannelId::new(200)))
            .unwrap();
        assert_eq!(channel.entity.as_channel().unwrap().guild_id, Some(g));
        let role = cache.get(&CacheKey::role(g, RoleId::new(300))).unwrap();
        assert_eq!(role.entity.as_role().unwrap().permissions, 8);
        assert!(cache.get(&CacheKey::user(UserId::new(1))).is_some());
        assert_eq!(cache.values_of(Some(g), EntityKind::Presence).len(), 1);
    }

    #[test]
    fn test_member_update_is_partial() {
        let cache = EntityCache::default();
        cache.apply(decode(0, &frame("GUILD_CREATE", guild_payload())).unwrap().patch);

        let decoded = decode(
            0,
            &frame(
                "GUILD_MEMBER_UPDATE",
                json!({ "guild_id": "100", "user": { "id": "1", "username": "a" }, "nick": "ay" }),
            ),
        )
        .unwrap();
        assert!(cache.apply(decoded.patch).is_empty());

        let member = cache
            .get(&CacheKey::member(GuildId::new(100), UserId::new(1)))
            .unwrap();
        let member = member.entity.as_member().unwrap();
        assert_eq!(member.nick.as_deref(), Some("ay"));
        // Roles were not in the update and survive.
        assert_eq!(member.roles, vec![RoleId::new(300)]);
    }

    #[test]
    fn test_presence_update_for_unknown_user_is_stale() {
        let cache = EntityCache::default();
        let decoded = decode(
            0,
            &frame(
                "PRESENCE_UPDATE",
                json!({ "guild_id": "100", "user": { "id": "5" }, "status": "idle" }),
            ),
        )
        .unwrap();
        let errors = cache.apply(decoded.patch);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_guild_delete_variants() {
        let outage = decode(0, &frame("GUILD_DELETE", json!({ "id": "100", "unavailable": true })))
            .unwrap();
        assert!(matches!(
            outage.patch.ops(),
            [CacheOp::Upsert { update: Update::Partial(_), .. }]
        ));

        let left = decode(0, &frame("GUILD_DELETE", json!({ "id": "100" }))).unwrap();
        assert!(matches!(left.patch.ops(), [CacheOp::Remove { .. }]));
        assert_eq!(left.envelope.event.guild_id(), Some(GuildId::new(100)));
    }

    #[test]
    fn test_member_remove_drops_member_and_presence() {
        let decoded = decode(
            0,
            &frame(
                "GUILD_MEMBER_REMOVE",
                json!({ "guild_id": "100", "user": { "id": "2", "username": "b" } }),
            ),
        )
        .unwrap();
        assert_eq!(decoded.patch.len(), 2);
    }

    #[test]
    fn test_message_create_has_no_cache_writes() {
        let decoded = decode(
            0,
            &frame(
                "MESSAGE_CREATE",
                json!({
                    "id": "500",
                    "channel_id": "200",
                    "guild_id": "100",
                    "author": { "id": "1", "username": "a" },
                    "content": "hello"
                }),
            ),
        )
        .unwrap();
        assert!(decoded.patch.is_empty());
        assert_eq!(decoded.envelope.kind(), EventKind::MessageCreate);
    }

    #[test]
    fn test_unknown_passes_through() {
        let decoded = decode(0, &frame("TYPING_START", json!({ "x": 1 }))).unwrap();
        assert!(decoded.patch.is_empty());
        assert!(matches!(
            decoded.envelope.event,
            Event::Unknown { ref name, .. } if name == "TYPING_START"
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let err = decode(0, &frame("GUILD_ROLE_DELETE", json!({ "guild_id": "1" }))).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { ref event, .. } if event == "GUILD_ROLE_DELETE"));

        let err = decode(0, &frame("GUILD_UPDATE", json!("nope"))).unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn test_bad_permissions_rejected() {
        let err = decode(
            0,
            &frame(
                "GUILD_ROLE_CREATE",
                json!({ "guild_id": "1", "role": { "id": "2", "permissions": "lots" } }),
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("permissions"));
    }

    #[test]
    fn test_rest_member_payload() {
        let (member, user) = decode_member(
            GuildId::new(100),
            &json!({ "user": { "id": "1", "username": "a" }, "roles": ["7"], "nick": null }),
        )
        .unwrap();
        assert_eq!(member.guild_id, GuildId::new(100));
        assert_eq!(member.user_id, user.id);
        assert_eq!(member.roles, vec![RoleId::new(7)]);

        let err = decode_member(GuildId::new(100), &json!({ "nick": "x" })).unwrap_err();
        assert!(err.to_string().contains("member"));
    }

    #[test]
    fn test_rest_user_and_channel_payloads() {
        let user = decode_user(&json!({ "id": "5", "username": "e", "bot": true })).unwrap();
        assert!(user.bot);

        let channel =
            decode_channel(&json!({ "id": "20", "type": 0, "guild_id": "100", "name": "general" }))
                .unwrap();
        assert_eq!(channel.guild_id, Some(GuildId::new(100)));
        assert!(decode_channel(&json!([])).is_err());
    }
}
