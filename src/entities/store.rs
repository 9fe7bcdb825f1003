//! In-memory index of every peer seen so far, resolvable by several keys.

use super::{EntityRecord, Reference};
use crate::errors::EntityNotFound;
use crate::parse::{parse_phone, parse_username, ParsedUsername};
use crate::tl::{Entity, InputChannel, InputPeer, PeerKind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Single-entity fields searched inside response objects.
const ENTITY_FIELDS: &[&str] = &["user", "chat", "channel"];
/// List fields searched inside response objects.
const ENTITY_LIST_FIELDS: &[&str] = &["users", "chats"];

/// Entity cache keyed by marked id, with secondary indexes on username, phone and name.
///
/// The store is plain data: mutation and lookup run on the caller's task and
/// need no locking.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    records: HashMap<i64, EntityRecord>,
    by_username: KeyIndex,
    by_phone: KeyIndex,
    by_name: KeyIndex,
}

/// Secondary key to every marked id currently holding it.
type KeyIndex = HashMap<String, BTreeSet<i64>>;

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been indexed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record stored under a marked id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&EntityRecord> {
        self.records.get(&id)
    }

    /// All records, ordered by marked id.
    #[must_use]
    pub fn records(&self) -> Vec<&EntityRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_username.clear();
        self.by_phone.clear();
        self.by_name.clear();
    }

    /// Inserts or replaces the record for `record.id` (last write wins).
    pub fn upsert(&mut self, record: EntityRecord) {
        let id = record.id;
        if let Some(previous) = self.records.remove(&id) {
            self.unindex(&previous);
        }
        for (index, key) in [
            (&mut self.by_username, &record.username),
            (&mut self.by_phone, &record.phone),
            (&mut self.by_name, &record.name),
        ] {
            if let Some(key) = key {
                index.entry(key.clone()).or_default().insert(id);
            }
        }
        self.records.insert(id, record);
    }

    /// Drops only this record's id from its keys; other holders keep them.
    fn unindex(&mut self, record: &EntityRecord) {
        let id = record.id;
        for (index, key) in [
            (&mut self.by_username, &record.username),
            (&mut self.by_phone, &record.phone),
            (&mut self.by_name, &record.name),
        ] {
            if let Some(key) = key {
                if let Some(ids) = index.get_mut(key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        index.remove(key);
                    }
                }
            }
        }
    }

    /// Indexes every user, chat and channel embedded in a protocol response.
    ///
    /// Anything that cannot be interpreted safely is skipped; this never fails.
    /// Returns how many records were written.
    pub fn process_entities(&mut self, response: &Value) -> usize {
        let mut candidates = Vec::new();
        collect_candidates(response, &mut candidates);

        let now = chrono::Utc::now().timestamp();
        let mut written = 0;
        for candidate in candidates {
            let Ok(entity) = Entity::deserialize(candidate) else {
                trace!("Skipping non-entity constructor {:?}", candidate.get("_"));
                continue;
            };
            match EntityRecord::from_entity(&entity, Some(now)) {
                Some(record) => {
                    self.upsert(record);
                    written += 1;
                }
                None => trace!("Skipping unaddressable entity {:?}", entity.peer()),
            }
        }

        if written > 0 {
            debug!("Indexed {} entities ({} total)", written, self.records.len());
        }
        written
    }

    /// Resolves any reference into a protocol-addressable peer.
    ///
    /// # Errors
    ///
    /// Returns [`EntityNotFound`] when no stored record matches.
    pub fn get_input_entity(&self, reference: &Reference) -> Result<InputPeer, EntityNotFound> {
        let record = match reference {
            Reference::InputPeer(peer) => return Ok(*peer),
            Reference::Peer(peer) => peer.marked_id().and_then(|id| self.get(id)),
            Reference::Entity(entity) => entity.peer().marked_id().and_then(|id| self.get(id)),
            Reference::Id(id) => self
                .find_by_phone(&id.to_string())
                .or_else(|| self.get(*id)),
            Reference::Text(text) => self.find_by_text(text),
        };

        record
            .and_then(EntityRecord::input_peer)
            .ok_or_else(|| EntityNotFound(reference.clone()))
    }

    /// Resolves a reference that must name a channel.
    ///
    /// # Errors
    ///
    /// Returns [`EntityNotFound`] when nothing matches or the match is not a channel.
    pub fn input_channel(&self, reference: &Reference) -> Result<InputChannel, EntityNotFound> {
        let peer = self.get_input_entity(reference)?;
        InputChannel::try_from(peer).map_err(|_| EntityNotFound(reference.clone()))
    }

    fn find_by_text(&self, text: &str) -> Option<&EntityRecord> {
        parse_phone(text)
            .and_then(|phone| self.find_by_phone(&phone))
            .or_else(|| match parse_username(text) {
                Some(ParsedUsername::Username(username)) => self.find_in(&self.by_username, &username),
                Some(ParsedUsername::Invite(_)) | None => None,
            })
            .or_else(|| {
                text.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|id| self.find_by_bare_id(id))
            })
            .or_else(|| self.find_in(&self.by_name, text))
    }

    fn find_by_phone(&self, phone: &str) -> Option<&EntityRecord> {
        self.find_in(&self.by_phone, phone)
    }

    /// Several records may share a key; the highest marked id wins, which
    /// prefers users over chats over channels.
    fn find_in(&self, index: &KeyIndex, key: &str) -> Option<&EntityRecord> {
        index
            .get(key)
            .and_then(|ids| ids.iter().rev().find_map(|id| self.records.get(id)))
    }

    /// A bare id could live in any namespace, so all three marked forms are tried.
    /// Already-marked (non-positive) ids are matched as they are.
    fn find_by_bare_id(&self, id: i64) -> Option<&EntityRecord> {
        if id <= 0 {
            return self.get(id);
        }
        [PeerKind::User, PeerKind::Chat, PeerKind::Channel]
            .into_iter()
            .filter_map(|kind| kind.marked_id(id))
            .find_map(|marked| self.get(marked))
    }
}

fn collect_candidates<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_candidates(item, out);
            }
        }
        Value::Object(fields) => {
            if fields.get("_").is_some_and(Value::is_string) {
                out.push(value);
            }
            for key in ENTITY_FIELDS.iter().chain(ENTITY_LIST_FIELDS) {
                if let Some(child) = fields.get(*key) {
                    collect_candidates(child, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tl::Peer;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "_": "messages.Chats",
            "users": [
                {"_": "User", "id": 1, "access_hash": 111, "username": "Alice",
                 "phone": "15550001", "first_name": "Alice", "last_name": "A"},
                {"_": "UserEmpty", "id": 2}
            ],
            "chats": [
                {"_": "Chat", "id": 3, "title": "Book club"},
                {"_": "Channel", "id": 4, "access_hash": 444, "username": "News_Feed", "title": "News"}
            ]
        })
    }

    #[test]
    fn test_process_entities_skips_placeholders() {
        let mut store = EntityStore::new();
        assert_eq!(store.process_entities(&sample_response()), 3);
        assert_eq!(store.len(), 3);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_process_entities_is_idempotent() {
        let mut store = EntityStore::new();
        store.process_entities(&sample_response());
        store.process_entities(&sample_response());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_process_entities_accepts_single_fields_and_lists() {
        let mut store = EntityStore::new();
        store.process_entities(&json!({
            "_": "UpdateShort",
            "user": {"_": "User", "id": 8, "access_hash": 80},
            "channel": {"_": "Channel", "id": 9, "access_hash": 90}
        }));
        store.process_entities(&json!([
            {"_": "Chat", "id": 10, "title": "Ten"},
            {"_": "Channel", "id": 11}
        ]));
        assert_eq!(store.len(), 3);
        assert!(store.get(-10).is_some());
        assert!(store.get(-1_000_000_000_011).is_none());
    }

    #[test]
    fn test_process_entities_never_fails_on_garbage() {
        let mut store = EntityStore::new();
        for value in [
            json!(null),
            json!("User"),
            json!({"users": "not a list"}),
            json!({"_": "User", "id": "seven"}),
            json!({"_": "User", "id": -5, "access_hash": 1}),
        ] {
            assert_eq!(store.process_entities(&value), 0);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_resolution_by_each_key() {
        let mut store = EntityStore::new();
        store.process_entities(&sample_response());

        let alice = InputPeer::User {
            user_id: 1,
            access_hash: 111,
        };
        assert_eq!(store.get_input_entity(&"+1 555 0001".into()), Ok(alice));
        assert_eq!(store.get_input_entity(&"@ALICE".into()), Ok(alice));
        assert_eq!(store.get_input_entity(&"Alice A".into()), Ok(alice));
        assert_eq!(store.get_input_entity(&1_i64.into()), Ok(alice));
        assert_eq!(
            store.get_input_entity(&Peer::Chat { chat_id: 3 }.into()),
            Ok(InputPeer::Chat { chat_id: 3 })
        );
        assert_eq!(
            store.input_channel(&"t.me/news_feed".into()),
            Ok(InputChannel {
                channel_id: 4,
                access_hash: 444
            })
        );
    }

    #[test]
    fn test_input_peer_is_returned_unchanged() {
        let store = EntityStore::new();
        let peer = InputPeer::Channel {
            channel_id: 5,
            access_hash: 6,
        };
        assert_eq!(store.get_input_entity(&peer.into()), Ok(peer));
    }

    #[test]
    fn test_renamed_username_drops_stale_key() {
        let mut store = EntityStore::new();
        store.process_entities(&json!({"_": "User", "id": 1, "access_hash": 1, "username": "old_name"}));
        store.process_entities(&json!({"_": "User", "id": 1, "access_hash": 1, "username": "new_name"}));
        assert!(store.get_input_entity(&"old_name".into()).is_err());
        assert!(store.get_input_entity(&"new_name".into()).is_ok());
    }

    #[test]
    fn test_min_constructor_keeps_known_hash() {
        let mut store = EntityStore::new();
        store.process_entities(&json!({"_": "User", "id": 1, "access_hash": 10}));
        let written = store.process_entities(&json!({"_": "User", "id": 1, "access_hash": 99, "min": true}));
        assert_eq!(written, 0);
        assert_eq!(store.get(1).map(|r| r.hash), Some(10));
    }

    #[test]
    fn test_shared_name_survives_rename_of_other_holder() {
        let mut store = EntityStore::new();
        store.process_entities(&json!([
            {"_": "User", "id": 1, "access_hash": 10, "first_name": "John"},
            {"_": "User", "id": 2, "access_hash": 20, "first_name": "John"}
        ]));
        store.process_entities(&json!({"_": "User", "id": 2, "access_hash": 20, "first_name": "Jack"}));

        assert_eq!(
            store.get_input_entity(&"John".into()),
            Ok(InputPeer::User {
                user_id: 1,
                access_hash: 10
            })
        );
        assert_eq!(
            store.get_input_entity(&"Jack".into()),
            Ok(InputPeer::User {
                user_id: 2,
                access_hash: 20
            })
        );
    }

    #[test]
    fn test_shared_username_survives_rename_of_other_holder() {
        let mut store = EntityStore::new();
        store.process_entities(&json!({"_": "Channel", "id": 5, "access_hash": 50, "username": "shared"}));
        store.process_entities(&json!({"_": "User", "id": 6, "access_hash": 60, "username": "shared"}));
        store.process_entities(&json!({"_": "User", "id": 6, "access_hash": 60, "username": "renamed"}));

        assert_eq!(
            store.get_input_entity(&"@shared".into()),
            Ok(InputPeer::Channel {
                channel_id: 5,
                access_hash: 50
            })
        );
    }

    #[test]
    fn test_shared_key_prefers_user_holder() {
        let mut store = EntityStore::new();
        store.process_entities(&json!([
            {"_": "Channel", "id": 7, "access_hash": 70, "title": "Lobby"},
            {"_": "User", "id": 8, "access_hash": 80, "first_name": "Lobby"}
        ]));
        assert_eq!(
            store.get_input_entity(&"Lobby".into()),
            Ok(InputPeer::User {
                user_id: 8,
                access_hash: 80
            })
        );
    }

    #[test]
    fn test_invite_links_are_not_usernames() {
        let mut store = EntityStore::new();
        store.process_entities(&json!({"_": "User", "id": 1, "access_hash": 1, "username": "joinchat"}));
        assert!(store.get_input_entity(&"t.me/joinchat/joinchat".into()).is_err());
    }

    #[test]
    fn test_records_are_sorted_by_id() {
        let mut store = EntityStore::new();
        store.process_entities(&sample_response());
        let ids: Vec<i64> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![-1_000_000_000_004, -3, 1]);
    }
}
