//! Entity records and the references that resolve to them.

mod store;

pub use store::EntityStore;

use crate::parse::parse_phone;
use crate::tl::{Entity, InputPeer, Peer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One remembered peer: everything needed to address it again without a network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Marked id (namespace-qualified).
    pub id: i64,
    /// Access hash, `0` for kinds that do not need one.
    pub hash: i64,
    /// Lower-cased public username.
    pub username: Option<String>,
    /// Phone number, digits only.
    pub phone: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Unix time (seconds) the entity was last observed.
    pub date: Option<i64>,
}

impl EntityRecord {
    /// Derives a record from a protocol entity.
    ///
    /// Returns `None` for entities that cannot be addressed safely: reduced
    /// (`min`) constructors, non-positive ids, and channels without a hash.
    #[must_use]
    pub fn from_entity(entity: &Entity, date: Option<i64>) -> Option<Self> {
        let (hash, username, phone) = match entity {
            Entity::User(user) => {
                if user.min {
                    return None;
                }
                (
                    user.access_hash.unwrap_or(0),
                    user.username.as_deref(),
                    user.phone.as_deref(),
                )
            }
            Entity::Chat(_) => (0, None, None),
            Entity::Channel(channel) => {
                if channel.min {
                    return None;
                }
                (channel.access_hash?, channel.username.as_deref(), None)
            }
        };

        let peer = entity.peer();
        if peer.bare_id() <= 0 {
            return None;
        }

        Some(Self {
            id: peer.marked_id()?,
            hash,
            username: username
                .filter(|u| !u.is_empty())
                .map(str::to_lowercase),
            phone: phone.and_then(parse_phone),
            name: entity.display_name(),
            date,
        })
    }

    /// Rebuilds the addressing envelope for this record.
    #[must_use]
    pub fn input_peer(&self) -> Option<InputPeer> {
        InputPeer::from_marked(self.id, self.hash)
    }
}

/// Anything a caller may use to name a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Already addressable; resolution returns it unchanged.
    InputPeer(InputPeer),
    /// A typed peer; matched exactly by marked id.
    Peer(Peer),
    /// A full entity object; matched exactly by marked id.
    Entity(Entity),
    /// A numeric id: tried as a phone number, then as an exact marked id.
    Id(i64),
    /// Phone number, username, numeric string or display name.
    Text(String),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputPeer(peer) => write!(f, "{peer:?}"),
            Self::Peer(peer) => write!(f, "{peer:?}"),
            Self::Entity(entity) => write!(f, "{:?}", entity.peer()),
            Self::Id(id) => write!(f, "{id}"),
            Self::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl From<InputPeer> for Reference {
    fn from(peer: InputPeer) -> Self {
        Self::InputPeer(peer)
    }
}

impl From<Peer> for Reference {
    fn from(peer: Peer) -> Self {
        Self::Peer(peer)
    }
}

impl From<Entity> for Reference {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<i64> for Reference {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for Reference {
    fn from(id: i32) -> Self {
        Self::Id(id.into())
    }
}

impl From<u64> for Reference {
    fn from(id: u64) -> Self {
        i64::try_from(id).map_or_else(|_| Self::Text(id.to_string()), Self::Id)
    }
}

/// Big integers outside the `i64` range fall back to their decimal text,
/// which can still match a stored phone number.
impl From<i128> for Reference {
    fn from(id: i128) -> Self {
        i64::try_from(id).map_or_else(|_| Self::Text(id.to_string()), Self::Id)
    }
}

impl From<&str> for Reference {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Reference {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
