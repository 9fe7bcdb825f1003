//! Minimal typed protocol surface consumed by the session core.
//!
//! The wire library hands us responses in their "to-dict" shape: every
//! constructor object carries a `"_"` tag naming it. Only the handful of
//! constructors the entity cache needs are modelled as Rust types here; every
//! other shape stays a [`serde_json::Value`].

use serde::{Deserialize, Serialize};

/// Offset applied to channel ids when they are folded into the marked id space.
pub const CHANNEL_MARK_OFFSET: i64 = 1_000_000_000_000;

/// The three peer namespaces of the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerKind {
    /// A user or bot account.
    User,
    /// A basic group chat.
    Chat,
    /// A channel or supergroup.
    Channel,
}

impl PeerKind {
    /// Folds a bare id into the marked id space of this namespace.
    ///
    /// Returns `None` when the result does not fit into an `i64`.
    #[must_use]
    pub fn marked_id(self, bare_id: i64) -> Option<i64> {
        match self {
            Self::User => Some(bare_id),
            Self::Chat => bare_id.checked_neg(),
            Self::Channel => CHANNEL_MARK_OFFSET
                .checked_add(bare_id)
                .and_then(i64::checked_neg),
        }
    }
}

/// Splits a marked id back into its namespace and bare id.
///
/// # Examples
///
/// ```
/// use oxide_session::tl::{resolve_marked_id, PeerKind};
///
/// assert_eq!(resolve_marked_id(42), Some((PeerKind::User, 42)));
/// assert_eq!(resolve_marked_id(-42), Some((PeerKind::Chat, 42)));
/// assert_eq!(resolve_marked_id(-1_000_000_000_042), Some((PeerKind::Channel, 42)));
/// ```
#[must_use]
pub fn resolve_marked_id(marked_id: i64) -> Option<(PeerKind, i64)> {
    if marked_id >= 0 {
        return Some((PeerKind::User, marked_id));
    }
    let positive = marked_id.checked_neg()?;
    if positive > CHANNEL_MARK_OFFSET {
        Some((PeerKind::Channel, positive - CHANNEL_MARK_OFFSET))
    } else {
        Some((PeerKind::Chat, positive))
    }
}

/// A typed peer reference without access material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum Peer {
    /// `peerUser`
    #[serde(rename = "PeerUser")]
    User {
        /// Bare user id.
        user_id: i64,
    },
    /// `peerChat`
    #[serde(rename = "PeerChat")]
    Chat {
        /// Bare chat id.
        chat_id: i64,
    },
    /// `peerChannel`
    #[serde(rename = "PeerChannel")]
    Channel {
        /// Bare channel id.
        channel_id: i64,
    },
}

impl Peer {
    /// Namespace of this peer.
    #[must_use]
    pub const fn kind(&self) -> PeerKind {
        match self {
            Self::User { .. } => PeerKind::User,
            Self::Chat { .. } => PeerKind::Chat,
            Self::Channel { .. } => PeerKind::Channel,
        }
    }

    /// Bare id inside the peer's namespace.
    #[must_use]
    pub const fn bare_id(&self) -> i64 {
        match self {
            Self::User { user_id } => *user_id,
            Self::Chat { chat_id } => *chat_id,
            Self::Channel { channel_id } => *channel_id,
        }
    }

    /// Marked id of this peer.
    #[must_use]
    pub fn marked_id(&self) -> Option<i64> {
        self.kind().marked_id(self.bare_id())
    }
}

/// A protocol-addressable peer, carrying whatever access hash its kind needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum InputPeer {
    /// `inputPeerEmpty`
    #[serde(rename = "InputPeerEmpty")]
    Empty,
    /// `inputPeerSelf`
    #[serde(rename = "InputPeerSelf")]
    PeerSelf,
    /// `inputPeerUser`
    #[serde(rename = "InputPeerUser")]
    User {
        /// Bare user id.
        user_id: i64,
        /// Access hash issued for this user.
        access_hash: i64,
    },
    /// `inputPeerChat`
    #[serde(rename = "InputPeerChat")]
    Chat {
        /// Bare chat id.
        chat_id: i64,
    },
    /// `inputPeerChannel`
    #[serde(rename = "InputPeerChannel")]
    Channel {
        /// Bare channel id.
        channel_id: i64,
        /// Access hash issued for this channel.
        access_hash: i64,
    },
}

impl InputPeer {
    /// Rebuilds the addressing envelope for a stored marked id and hash.
    #[must_use]
    pub fn from_marked(marked_id: i64, access_hash: i64) -> Option<Self> {
        let (kind, bare_id) = resolve_marked_id(marked_id)?;
        Some(match kind {
            PeerKind::User => Self::User {
                user_id: bare_id,
                access_hash,
            },
            PeerKind::Chat => Self::Chat { chat_id: bare_id },
            PeerKind::Channel => Self::Channel {
                channel_id: bare_id,
                access_hash,
            },
        })
    }

    /// Marked id addressed by this peer, `None` for `Empty` and `PeerSelf`.
    #[must_use]
    pub fn marked_id(&self) -> Option<i64> {
        match self {
            Self::Empty | Self::PeerSelf => None,
            Self::User { user_id, .. } => PeerKind::User.marked_id(*user_id),
            Self::Chat { chat_id } => PeerKind::Chat.marked_id(*chat_id),
            Self::Channel { channel_id, .. } => PeerKind::Channel.marked_id(*channel_id),
        }
    }
}

/// `inputChannel`, the envelope channel-only methods take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputChannel {
    /// Bare channel id.
    pub channel_id: i64,
    /// Access hash issued for this channel.
    pub access_hash: i64,
}

impl TryFrom<InputPeer> for InputChannel {
    type Error = InputPeer;

    fn try_from(peer: InputPeer) -> Result<Self, Self::Error> {
        match peer {
            InputPeer::Channel {
                channel_id,
                access_hash,
            } => Ok(Self {
                channel_id,
                access_hash,
            }),
            other => Err(other),
        }
    }
}

/// `user` constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Bare user id.
    pub id: i64,
    /// Access hash, absent on some constructors.
    #[serde(default)]
    pub access_hash: Option<i64>,
    /// Public username without the `@`.
    #[serde(default)]
    pub username: Option<String>,
    /// Phone number in international format without the `+`.
    #[serde(default)]
    pub phone: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Set when the server sent a reduced constructor whose hash is not usable.
    #[serde(default)]
    pub min: bool,
}

/// `chat` / `chatForbidden` constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Bare chat id.
    pub id: i64,
    /// Chat title.
    #[serde(default)]
    pub title: Option<String>,
}

/// `channel` / `channelForbidden` constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Bare channel id.
    pub id: i64,
    /// Access hash, absent on some constructors.
    #[serde(default)]
    pub access_hash: Option<i64>,
    /// Public username without the `@`.
    #[serde(default)]
    pub username: Option<String>,
    /// Channel title.
    #[serde(default)]
    pub title: Option<String>,
    /// Set when the server sent a reduced constructor whose hash is not usable.
    #[serde(default)]
    pub min: bool,
}

/// Any entity object the cache knows how to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum Entity {
    /// A user.
    User(User),
    /// A basic group.
    #[serde(alias = "ChatForbidden")]
    Chat(Chat),
    /// A channel or supergroup.
    #[serde(alias = "ChannelForbidden")]
    Channel(Channel),
}

impl Entity {
    /// The typed peer this entity lives at.
    #[must_use]
    pub const fn peer(&self) -> Peer {
        match self {
            Self::User(u) => Peer::User { user_id: u.id },
            Self::Chat(c) => Peer::Chat { chat_id: c.id },
            Self::Channel(c) => Peer::Channel { channel_id: c.id },
        }
    }

    /// Human-readable name: "first last" for users, the title otherwise.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let name = match self {
            Self::User(u) => {
                let first = u.first_name.as_deref().unwrap_or_default();
                let last = u.last_name.as_deref().unwrap_or_default();
                format!("{first} {last}").trim().to_string()
            }
            Self::Chat(c) => c.title.clone().unwrap_or_default(),
            Self::Channel(c) => c.title.clone().unwrap_or_default(),
        };
        (!name.is_empty()).then_some(name)
    }
}
