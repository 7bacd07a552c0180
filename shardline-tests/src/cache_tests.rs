//! Cache contents driven by gateway events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use shardline_cache::{
    CacheConfig, CacheError, CacheKey, Entity, EntityCache, EntityKind, Member, Update, User,
};
use shardline_core::{ChannelId, GuildId, UserId};
use shardline_events::{
    decode, DispatchFrame, Envelope, Event, EventFilter, EventKind, EventStream, ListenerError,
};
use shardline_gateway::{GatewayConfig, ShardState};

use crate::scenarios::{
    guild_create, guild_delete, member_add, member_remove, message, presence, ready,
    wait_for_state, Harness, HEARTBEAT, SELF_ID,
};
use crate::scripted_gateway::RemoteEnd;

const GUILD: GuildId = GuildId::new(100);
const A: UserId = UserId::new(1);
const B: UserId = UserId::new(2);

/// A connected single-shard harness holding guild 100 with members A and B.
async fn connected_with_guild() -> (Harness, RemoteEnd, EventStream) {
    let h = Harness::new(GatewayConfig::for_testing()).unwrap();
    let stream = h.events.subscribe_channel(EventFilter::all(), 64);
    let mut remote = h.gateway.expect_connection();
    h.start(1).unwrap();
    let mut info = h.watch(0).unwrap();

    remote.hello(HEARTBEAT);
    remote.next_frame().await.unwrap();
    remote.dispatch(1, "READY", ready("s1", [0, 1], &[GUILD.get()]));
    remote.dispatch(2, "GUILD_CREATE", guild_create(GUILD.get(), &[A.get(), B.get()]));
    wait_for_state(&mut info, ShardState::Connected).await.unwrap();
    (h, remote, stream)
}

/// Receives events until one of `kind` arrives.
async fn next_of(stream: &mut EventStream, kind: EventKind) -> Arc<Envelope> {
    loop {
        let event = stream.recv().await.unwrap();
        if event.kind() == kind {
            return event;
        }
    }
}

/// Users with a cached member entry in `guild`, in id order.
fn member_ids(cache: &EntityCache, guild: GuildId) -> Vec<UserId> {
    let members = cache.values_of(Some(guild), EntityKind::Member);
    let mut ids: Vec<UserId> = members
        .entities()
        .filter_map(Entity::as_member)
        .map(|member| member.user_id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test(start_paused = true)]
async fn test_guild_lifecycle() {
    let (h, remote, mut stream) = connected_with_guild().await;
    next_of(&mut stream, EventKind::GuildCreate).await;

    assert!(h.cache.get(&CacheKey::guild(GUILD)).is_some());
    assert_eq!(member_ids(&h.cache, GUILD), vec![A, B]);
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_some());
    assert!(h.cache.get(&CacheKey::member(GUILD, B)).is_some());
    assert!(h
        .cache
        .get(&CacheKey::channel(Some(GUILD), ChannelId::new(1_000)))
        .is_some());
    assert_eq!(h.cache.self_user_id(), Some(UserId::new(SELF_ID)));
    let stats = h.cache.stats();
    assert_eq!(stats.members, 2);
    assert_eq!(stats.users, 3);

    remote.dispatch(3, "GUILD_MEMBER_REMOVE", member_remove(GUILD.get(), B.get()));
    next_of(&mut stream, EventKind::MemberRemove).await;
    assert_eq!(member_ids(&h.cache, GUILD), vec![A]);
    assert!(h.cache.get(&CacheKey::member(GUILD, B)).is_none());
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_some());
    assert!(h.cache.get(&CacheKey::user(B)).is_some());

    remote.dispatch(4, "GUILD_DELETE", guild_delete(GUILD.get(), false));
    next_of(&mut stream, EventKind::GuildDelete).await;
    assert!(h.cache.get(&CacheKey::guild(GUILD)).is_none());
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_none());
    assert!(member_ids(&h.cache, GUILD).is_empty());
    assert!(h.cache.values(Some(GUILD)).is_empty());
    assert!(h.cache.get(&CacheKey::user(A)).is_some());
    assert!(h.cache.get(&CacheKey::user(B)).is_some());
    assert!(h.cache.guild_ids().is_empty());

    h.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_guild_outage_keeps_contents() {
    let (h, remote, mut stream) = connected_with_guild().await;
    next_of(&mut stream, EventKind::GuildCreate).await;
    let before = h.cache.get(&CacheKey::guild(GUILD)).unwrap().version;

    remote.dispatch(3, "GUILD_DELETE", guild_delete(GUILD.get(), true));
    let event = next_of(&mut stream, EventKind::GuildDelete).await;
    assert!(matches!(
        event.event,
        Event::GuildDelete { unavailable: true, .. }
    ));

    let guild = h.cache.get(&CacheKey::guild(GUILD)).unwrap();
    assert!(guild.entity.as_guild().unwrap().unavailable);
    assert_eq!(guild.version, before + 1);
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_some());

    // The guild comes back with a fresh snapshot.
    remote.dispatch(4, "GUILD_CREATE", guild_create(GUILD.get(), &[B.get()]));
    next_of(&mut stream, EventKind::GuildCreate).await;
    let guild = h.cache.get(&CacheKey::guild(GUILD)).unwrap();
    assert!(!guild.entity.as_guild().unwrap().unavailable);
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_none());
    assert!(h.cache.get(&CacheKey::member(GUILD, B)).is_some());

    h.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cache_updated_before_listeners_run() {
    let h = Harness::new(GatewayConfig::for_testing()).unwrap();
    let cache = Arc::clone(&h.cache);
    let saw_member = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&saw_member);
    h.manager.subscribe(
        EventFilter::kind(EventKind::MemberAdd),
        move |event: &Envelope| -> Result<(), ListenerError> {
            if let Event::MemberAdd(member) = &event.event {
                let key = CacheKey::member(member.guild_id, member.user_id);
                flag.store(cache.get(&key).is_some(), Ordering::SeqCst);
            }
            Ok(())
        },
    );
    let mut stream = h
        .events
        .subscribe_channel(EventFilter::kind(EventKind::MemberAdd), 8);

    let mut remote = h.gateway.expect_connection();
    h.start(1).unwrap();
    remote.hello(HEARTBEAT);
    remote.next_frame().await.unwrap();
    remote.dispatch(1, "READY", ready("s1", [0, 1], &[GUILD.get()]));
    remote.dispatch(2, "GUILD_CREATE", guild_create(GUILD.get(), &[A.get()]));
    remote.dispatch(3, "GUILD_MEMBER_ADD", member_add(GUILD.get(), B.get()));

    stream.recv().await.unwrap();
    assert!(saw_member.load(Ordering::SeqCst));

    h.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_events_delivered_in_sequence_order() {
    let (h, remote, _stream) = connected_with_guild().await;
    let mut messages = h
        .events
        .subscribe_channel(EventFilter::kind(EventKind::MessageCreate), 64);

    for seq in 3..23 {
        remote.dispatch(seq, "MESSAGE_CREATE", message(seq, GUILD.get(), A.get(), "hi"));
    }

    let mut seen = Vec::new();
    for _ in 3..23 {
        let event = messages.recv().await.unwrap();
        assert_eq!(event.shard, 0);
        seen.push(event.seq.unwrap());
    }
    assert_eq!(seen, (3..23).collect::<Vec<_>>());
    assert_eq!(h.manager.shard(0).unwrap().sequence, Some(22));

    h.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_presence_for_unknown_member_not_created() {
    let (h, remote, mut stream) = connected_with_guild().await;
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    h.manager.subscribe(
        EventFilter::kind(EventKind::PresenceUpdate),
        move |_: &Envelope| -> Result<(), ListenerError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    remote.dispatch(3, "PRESENCE_UPDATE", presence(GUILD.get(), A.get(), "idle"));
    next_of(&mut stream, EventKind::PresenceUpdate).await;

    // The event is still published even though the cache had nothing to patch.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(h.cache.get(&CacheKey::presence(GUILD, A)).is_none());
    assert!(h.cache.get(&CacheKey::member(GUILD, A)).is_some());

    h.manager.stop().await;
}

#[test]
fn test_disabled_kinds_skipped() {
    let cache = EntityCache::new(CacheConfig::with_kinds([EntityKind::Guild, EntityKind::User]));
    let frame = DispatchFrame::new(1, "GUILD_CREATE", guild_create(GUILD.get(), &[A.get(), B.get()]));
    let decoded = decode(0, &frame).unwrap();
    assert!(cache.apply(decoded.patch).is_empty());

    let stats = cache.stats();
    assert_eq!(stats.guilds, 1);
    assert_eq!(stats.users, 2);
    assert_eq!(stats.members, 0);
    assert_eq!(stats.channels, 0);

    let member = Member {
        guild_id: GUILD,
        user_id: A,
        nick: None,
        roles: Vec::new(),
        joined_at: None,
        pending: false,
    };
    assert!(matches!(
        cache.upsert(CacheKey::member(GUILD, A), Update::Full(Entity::Member(member))),
        Err(CacheError::KindDisabled {
            kind: EntityKind::Member
        })
    ));
}

#[test]
fn test_concurrent_upserts_count_every_write() {
    let cache = Arc::new(EntityCache::new(CacheConfig::default()));
    let writers = 8;
    let writes = 250;

    std::thread::scope(|scope| {
        for w in 0..writers {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for i in 0..writes {
                    let user = User {
                        id: A,
                        username: format!("w{w}-{i}"),
                        global_name: None,
                        avatar: None,
                        bot: false,
                    };
                    cache
                        .upsert(CacheKey::user(A), Update::Full(Entity::User(user)))
                        .unwrap();
                }
            });
        }
    });

    let entry = cache.get(&CacheKey::user(A)).unwrap();
    assert_eq!(entry.version, writers * writes);
}
