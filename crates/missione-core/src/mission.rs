//! Mission record types and the wire greeting.

use serde::{Deserialize, Serialize};

/// A warehouse mission: which shelf, slot, and level to visit, and which
/// mission kind to execute there.
///
/// Immutable once constructed; every inbound message produces a brand-new
/// record. Serialized field order is fixed (scaffale, posto, livello,
/// missione) and `serde_json::to_string` yields the compact canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    /// Shelf identifier.
    pub scaffale: i64,
    /// Slot identifier within the shelf.
    pub posto: i64,
    /// Level identifier.
    pub livello: i64,
    /// Mission identifier.
    pub missione: i64,
}

/// A [`Mission`] enriched at publish time with a process-lifetime sequence
/// number and an epoch-millisecond timestamp.
///
/// Wire field order: the four mission fields, then `seq`, then `ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedMission {
    /// Shelf identifier.
    pub scaffale: i64,
    /// Slot identifier within the shelf.
    pub posto: i64,
    /// Level identifier.
    pub livello: i64,
    /// Mission identifier.
    pub missione: i64,
    /// Strictly increasing publish counter, starting at 1.
    pub seq: u64,
    /// Milliseconds since epoch, captured at publish time.
    pub ts: i64,
}

impl StampedMission {
    /// Attach a sequence number and timestamp to a mission.
    pub fn stamp(mission: Mission, seq: u64, ts: i64) -> Self {
        Self {
            scaffale: mission.scaffale,
            posto: mission.posto,
            livello: mission.livello,
            missione: mission.missione,
            seq,
            ts,
        }
    }

    /// The underlying mission without its stamp.
    pub fn mission(&self) -> Mission {
        Mission {
            scaffale: self.scaffale,
            posto: self.posto,
            livello: self.livello,
            missione: self.missione,
        }
    }
}

/// The unsolicited greeting sent to a streaming client right after the
/// upgrade handshake. Sent to that client only, never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Message discriminator, always `"hello"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable connection note.
    pub info: String,
}

impl Hello {
    /// The greeting for a freshly connected client.
    pub fn connected() -> Self {
        Self {
            kind: "hello".into(),
            info: "connected".into(),
        }
    }
}
