//! WebSocket protocol message definitions
//! These are the wire types exchanged between peers through the relay

use serde::{Deserialize, Serialize};

/// Seat a peer holds in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// First peer in the room; runs the authoritative simulation
    Host,
    /// Second peer; renders mirrored snapshots
    Guest,
}

/// Which player a point or marker belongs to, in the sender's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The sender scored
    #[serde(rename = "self")]
    Own,
    /// The counterpart scored
    #[serde(rename = "opp")]
    Opp,
}

impl Side {
    pub fn swapped(self) -> Self {
        match self {
            Side::Own => Side::Opp,
            Side::Opp => Side::Own,
        }
    }
}

/// Terminal result of a match, in the sender's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    You,
    Opponent,
    Tie,
    #[serde(rename = "Opponent left")]
    OpponentLeft,
}

impl MatchOutcome {
    /// Flip You/Opponent when crossing to the other peer's perspective
    pub fn swapped(self) -> Self {
        match self {
            MatchOutcome::You => MatchOutcome::Opponent,
            MatchOutcome::Opponent => MatchOutcome::You,
            other => other,
        }
    }
}

/// Round wins per side, in the sender's perspective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    #[serde(rename = "self")]
    pub own: u8,
    pub opp: u8,
}

impl ScorePair {
    pub fn swapped(self) -> Self {
        Self {
            own: self.opp,
            opp: self.own,
        }
    }

    pub fn total(self) -> u8 {
        self.own + self.opp
    }
}

/// Normalized puck state: positions as fractions of the sender's field,
/// velocities as per-tick fractions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PuckSnapshot {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Goal indicator shown during the inter-round freeze, normalized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseMarker {
    pub side: Side,
    pub x: f64,
    pub y: f64,
}

/// Scoreboard and round number announced at a round boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEndPayload {
    pub rounds: ScorePair,
    pub current_round: u8,
}

/// Terminal outcome announced when the match is decided
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchEndPayload {
    pub winner: MatchOutcome,
}

/// One authoritative frame from the host, fully normalized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Monotonic frame counter; receivers discard stale frames
    pub seq: u64,
    pub puck: PuckSnapshot,
    /// Host paddle offset as a fraction of its horizontal travel
    pub host_paddle_pct: f64,
    /// Paddle width as a fraction of the field width
    pub paddle_w_pct: f64,
    pub rounds: ScorePair,
    pub pause_marker: Option<PauseMarker>,
}

/// Messages sent from a peer to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Take a seat in a room (first frame on every connection)
    #[serde(rename_all = "camelCase")]
    Join { room_id: String },

    /// Local paddle moved; forwarded to the counterpart
    #[serde(rename_all = "camelCase")]
    Paddle {
        room_id: String,
        /// Offset as a fraction of the sender's paddle travel
        #[serde(skip_serializing_if = "Option::is_none")]
        paddle_pct: Option<f64>,
        /// Legacy absolute offset in the sender's field units
        #[serde(skip_serializing_if = "Option::is_none")]
        paddle_x: Option<f64>,
    },

    /// Authoritative frame from the host
    #[serde(rename_all = "camelCase")]
    State {
        room_id: String,
        state: StateSnapshot,
    },

    /// A round finished and the next serve is coming
    #[serde(rename_all = "camelCase")]
    RoundEnd {
        room_id: String,
        payload: RoundEndPayload,
    },

    /// The match reached a terminal outcome
    #[serde(rename_all = "camelCase")]
    MatchEnd {
        room_id: String,
        payload: MatchEndPayload,
    },

    /// Restart the match from the terminal screen
    #[serde(rename_all = "camelCase")]
    PlayAgain { room_id: String },
}

impl ClientMsg {
    /// Room the message claims to belong to
    pub fn room_id(&self) -> &str {
        match self {
            ClientMsg::Join { room_id }
            | ClientMsg::Paddle { room_id, .. }
            | ClientMsg::State { room_id, .. }
            | ClientMsg::RoundEnd { room_id, .. }
            | ClientMsg::MatchEnd { room_id, .. }
            | ClientMsg::PlayAgain { room_id } => room_id,
        }
    }

    /// Convert to the frame the counterpart should receive. The room scope
    /// and the `payload` envelope stay on the sending side; `Join` never
    /// crosses the relay.
    pub fn to_relayed(&self) -> Option<ServerMsg> {
        match self {
            ClientMsg::Join { .. } => None,
            ClientMsg::Paddle {
                paddle_pct,
                paddle_x,
                ..
            } => Some(ServerMsg::Paddle {
                paddle_pct: *paddle_pct,
                paddle_x: *paddle_x,
            }),
            ClientMsg::State { state, .. } => Some(ServerMsg::State { state: *state }),
            ClientMsg::RoundEnd { payload, .. } => Some(ServerMsg::RoundEnd {
                rounds: payload.rounds,
                current_round: payload.current_round,
            }),
            ClientMsg::MatchEnd { payload, .. } => Some(ServerMsg::MatchEnd {
                winner: payload.winner,
            }),
            ClientMsg::PlayAgain { .. } => Some(ServerMsg::PlayAgain),
        }
    }
}

/// Messages sent from the relay to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Seat assignment, sent once right after a successful join
    Role { role: Role },

    /// The second peer arrived; sent to both seats
    #[serde(rename = "opponent:joined")]
    OpponentJoined,

    /// The counterpart disconnected
    #[serde(rename = "opponent:left")]
    OpponentLeft,

    /// Counterpart paddle moved
    #[serde(rename_all = "camelCase")]
    Paddle {
        #[serde(skip_serializing_if = "Option::is_none")]
        paddle_pct: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        paddle_x: Option<f64>,
    },

    /// Authoritative frame relayed from the host
    State { state: StateSnapshot },

    /// Round finished
    #[serde(rename_all = "camelCase")]
    RoundEnd {
        rounds: ScorePair,
        current_round: u8,
    },

    /// Match finished
    MatchEnd { winner: MatchOutcome },

    /// Counterpart asked for a rematch
    PlayAgain,

    /// Protocol or room error
    Error { code: String, message: String },
}
