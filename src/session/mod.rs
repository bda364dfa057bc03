//! Peer-side session engine
//!
//! A peer joins a room, adopts the role the relay assigns, and then runs
//! either the host loop (authoritative simulation) or the guest loop
//! (mirrored rendering). The engine talks to the transport through plain
//! message channels, so it runs over WebSocket and in-process alike; the
//! embedding UI drives it with commands and watches a render view.

pub mod guest;
pub mod host;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::game::field::FieldSize;
use crate::game::normalize::MarkerPoint;
use crate::game::physics::Puck;
use crate::game::rules::{MatchRules, Phase};
use crate::ws::protocol::{ClientMsg, Role, ScorePair, ServerMsg};

pub use guest::GuestView;
pub use host::HostCore;

/// Commands from the local player into the session task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionCommand {
    /// Local paddle moved to this fraction of its travel
    Paddle(f64),
    /// Restart from the terminal screen
    PlayAgain,
    /// Tear the session down
    Leave,
}

/// Everything a renderer needs each frame, in local field units and the
/// local player's perspective
#[derive(Debug, Clone, PartialEq)]
pub struct RenderView {
    pub phase: Phase,
    pub puck: Puck,
    /// Bottom paddle offset (the local player's)
    pub own_paddle: f64,
    /// Top paddle offset (the counterpart's)
    pub opponent_paddle: f64,
    pub paddle_width: f64,
    pub rounds: ScorePair,
    pub current_round: u8,
    pub pause_marker: Option<MarkerPoint>,
}

impl RenderView {
    fn initial(field: &FieldSize) -> Self {
        Self {
            phase: Phase::Waiting,
            puck: Puck::centered(field),
            own_paddle: field.centered_paddle(),
            opponent_paddle: field.centered_paddle(),
            paddle_width: field.paddle_width(),
            rounds: ScorePair::default(),
            current_round: 1,
            pause_marker: None,
        }
    }
}

/// Handle held by the embedding UI
pub struct SessionHandle {
    pub commands: mpsc::Sender<SessionCommand>,
    pub view: watch::Receiver<RenderView>,
}

/// Static configuration for one peer session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room_id: String,
    /// This peer's local absolute field
    pub field: FieldSize,
    pub rules: MatchRules,
    /// Seed for the host's serve randomness; ignored by guests
    pub rng_seed: u64,
}

impl SessionConfig {
    pub fn new(room_id: impl Into<String>, field: FieldSize) -> Self {
        Self {
            room_id: room_id.into(),
            field,
            rules: MatchRules::default(),
            rng_seed: rand::random(),
        }
    }
}

/// Clamp a raw local input fraction into the paddle's travel. Non-finite
/// input is refused so a broken pointer source cannot poison the paddle.
pub fn sanitize_fraction(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.clamp(0.0, 1.0))
}

/// Validate a relayed paddle payload against the receiver's own field.
/// A present but non-finite or out-of-range fraction is rejected outright;
/// the legacy absolute form is only consulted when the fraction is absent,
/// scaled through the receiver's travel and clamped.
pub fn remote_paddle_fraction(
    paddle_pct: Option<f64>,
    paddle_x: Option<f64>,
    field: &FieldSize,
) -> Option<f64> {
    if let Some(pct) = paddle_pct {
        if pct.is_finite() && (0.0..=1.0).contains(&pct) {
            return Some(pct);
        }
        return None;
    }

    let x = paddle_x?;
    if !x.is_finite() {
        return None;
    }
    Some((x / field.paddle_travel()).clamp(0.0, 1.0))
}

pub(crate) async fn send_to_relay(outbox: &mpsc::Sender<ClientMsg>, msg: ClientMsg) -> bool {
    outbox.send(msg).await.is_ok()
}

/// One peer's session: joins its room, adopts the assigned role, and runs
/// until the transport drops or the local player leaves.
pub struct PeerSession {
    config: SessionConfig,
    outbox: mpsc::Sender<ClientMsg>,
    inbox: mpsc::Receiver<ServerMsg>,
    commands: mpsc::Receiver<SessionCommand>,
    view_tx: watch::Sender<RenderView>,
}

impl PeerSession {
    pub fn new(
        config: SessionConfig,
        outbox: mpsc::Sender<ClientMsg>,
        inbox: mpsc::Receiver<ServerMsg>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (view_tx, view_rx) = watch::channel(RenderView::initial(&config.field));

        let session = Self {
            config,
            outbox,
            inbox,
            commands: command_rx,
            view_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            view: view_rx,
        };
        (session, handle)
    }

    /// Join the room and run whichever role the relay assigns
    pub async fn run(mut self) {
        let room_id = self.config.room_id.clone();

        let join = ClientMsg::Join {
            room_id: room_id.clone(),
        };
        if self.outbox.send(join).await.is_err() {
            warn!(room_id = %room_id, "Transport closed before join");
            return;
        }

        let role = loop {
            match self.inbox.recv().await {
                Some(ServerMsg::Role { role }) => break role,
                Some(ServerMsg::Error { code, message }) => {
                    warn!(room_id = %room_id, code = %code, message = %message, "Join refused");
                    return;
                }
                Some(other) => {
                    debug!(room_id = %room_id, msg = ?other, "Frame before seat assignment");
                }
                None => {
                    warn!(room_id = %room_id, "Transport closed while joining");
                    return;
                }
            }
        };

        info!(room_id = %room_id, role = ?role, "Session seated");
        match role {
            Role::Host => {
                host::run(
                    self.config,
                    self.outbox,
                    self.inbox,
                    self.commands,
                    self.view_tx,
                )
                .await
            }
            Role::Guest => {
                guest::run(
                    self.config,
                    self.outbox,
                    self.inbox,
                    self.commands,
                    self.view_tx,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_finite_input_and_refuses_the_rest() {
        assert_eq!(sanitize_fraction(0.42), Some(0.42));
        assert_eq!(sanitize_fraction(-0.2), Some(0.0));
        assert_eq!(sanitize_fraction(1.7), Some(1.0));
        assert_eq!(sanitize_fraction(f64::NAN), None);
        assert_eq!(sanitize_fraction(f64::INFINITY), None);
    }

    #[test]
    fn remote_fraction_rejects_bad_values_instead_of_clamping() {
        let field = FieldSize::new(800.0, 600.0);

        assert_eq!(remote_paddle_fraction(Some(0.5), None, &field), Some(0.5));
        assert_eq!(remote_paddle_fraction(Some(1.2), None, &field), None);
        assert_eq!(remote_paddle_fraction(Some(-0.1), None, &field), None);
        assert_eq!(remote_paddle_fraction(Some(f64::NAN), None, &field), None);

        // A bad fraction never falls through to the legacy field
        assert_eq!(
            remote_paddle_fraction(Some(f64::NAN), Some(100.0), &field),
            None
        );
        assert_eq!(remote_paddle_fraction(None, None, &field), None);
    }

    #[test]
    fn legacy_offsets_scale_through_the_receivers_travel() {
        let field = FieldSize::new(800.0, 600.0);
        let travel = field.paddle_travel();

        let frac = remote_paddle_fraction(None, Some(212.0), &field).unwrap();
        assert!((frac - 212.0 / travel).abs() < 1e-12);

        // Absolute offsets beyond the travel clamp to the edges
        assert_eq!(
            remote_paddle_fraction(None, Some(10_000.0), &field),
            Some(1.0)
        );
        assert_eq!(remote_paddle_fraction(None, Some(-5.0), &field), Some(0.0));
        assert_eq!(remote_paddle_fraction(None, Some(f64::NAN), &field), None);
    }
}
