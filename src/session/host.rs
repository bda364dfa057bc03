//! Authoritative host loop
//!
//! The host owns the puck, the scoreboard, and the phase machine. It
//! integrates physics at the simulation rate while a round is live,
//! freezes between rounds, and streams normalized snapshots to its
//! counterpart. The guest never simulates; everything it sees comes
//! from here.

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::field::FieldSize;
use crate::game::normalize::{self, MarkerPoint};
use crate::game::physics::{Puck, PuckPhysics};
use crate::game::rules::{GoalVerdict, MatchRules, Phase, RoundTracker};
use crate::util::time::{tick_duration, COUNTDOWN_TICK, ROUND_PAUSE};
use crate::ws::protocol::{
    ClientMsg, MatchEndPayload, RoundEndPayload, ScorePair, ServerMsg, Side, StateSnapshot,
};

use super::{
    remote_paddle_fraction, sanitize_fraction, send_to_relay, RenderView, SessionCommand,
    SessionConfig,
};

/// Parking deadline for the pause timer while no freeze is pending. The
/// deadline is always reset before the timer is armed, so the value only
/// has to be far away.
const PARKED: Duration = Duration::from_secs(3600);

/// Authoritative host state, independent of the loop driving it
pub struct HostCore {
    field: FieldSize,
    tracker: RoundTracker,
    puck: Puck,
    own_paddle: f64,
    opp_paddle: f64,
    speed_mult: f64,
    pause_marker: Option<MarkerPoint>,
    seq: u64,
    rng: ChaCha8Rng,
}

impl HostCore {
    pub fn new(field: FieldSize, rules: MatchRules, seed: u64) -> Self {
        Self {
            field,
            tracker: RoundTracker::new(rules),
            puck: Puck::centered(&field),
            own_paddle: field.centered_paddle(),
            opp_paddle: field.centered_paddle(),
            speed_mult: 1.0,
            pause_marker: None,
            seq: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    /// A counterpart took the other seat. When that begins a fresh match
    /// the serve is randomized here, so round one paces like any other.
    pub fn opponent_joined(&mut self) {
        if self.tracker.opponent_ready() {
            self.pause_marker = None;
            self.reset_round();
        }
    }

    pub fn tick_countdown(&mut self) -> bool {
        self.tracker.tick_countdown()
    }

    fn offset_from_fraction(&self, fraction: f64) -> f64 {
        fraction * self.field.paddle_travel()
    }

    /// Move the bottom paddle to a sanitized fraction of its travel
    pub fn set_own_paddle(&mut self, fraction: f64) {
        self.own_paddle = self.offset_from_fraction(fraction);
    }

    /// Apply a relayed paddle frame to the top paddle. Returns false when
    /// the payload is refused, in which case the last valid offset stands.
    pub fn apply_remote_paddle(&mut self, paddle_pct: Option<f64>, paddle_x: Option<f64>) -> bool {
        match remote_paddle_fraction(paddle_pct, paddle_x, &self.field) {
            Some(fraction) => {
                self.opp_paddle = self.offset_from_fraction(fraction);
                true
            }
            None => false,
        }
    }

    /// One simulation tick. Outside `Playing` the puck holds still.
    pub fn step(&mut self) -> Option<Side> {
        if !self.tracker.phase().is_playing() {
            return None;
        }
        PuckPhysics::step(
            &mut self.puck,
            &self.field,
            self.own_paddle,
            self.opp_paddle,
            self.field.paddle_width(),
            &mut self.speed_mult,
        )
    }

    /// Record a goal: scoreboard, verdict, marker placement
    pub fn goal(&mut self, side: Side) -> GoalVerdict {
        let verdict = self.tracker.record_goal(side);
        if verdict == GoalVerdict::PauseRound {
            self.pause_marker = Some(normalize::marker_for_goal(side, self.puck.x, &self.field));
        }
        verdict
    }

    /// End the inter-round freeze: clear the marker, advance the round,
    /// serve a fresh puck. Returns the scoreboard and the new round number
    /// for the round-end announcement.
    pub fn resume_round(&mut self) -> (ScorePair, u8) {
        self.pause_marker = None;
        let current_round = self.tracker.resume();
        self.reset_round();
        (self.tracker.rounds(), current_round)
    }

    fn reset_round(&mut self) {
        self.puck = Puck::centered(&self.field);
        let (dx, dy) = PuckPhysics::serve_velocity(&mut self.rng);
        self.puck.dx = dx;
        self.puck.dy = dy;
        self.speed_mult = 1.0;
        self.opp_paddle = self.field.centered_paddle();
    }

    /// Rematch from the terminal screen. Returns false when refused.
    pub fn play_again(&mut self) -> bool {
        if !self.tracker.reset() {
            return false;
        }
        self.pause_marker = None;
        self.reset_round();
        true
    }

    pub fn opponent_left(&mut self) {
        self.tracker.force_abandon();
    }

    /// Next outgoing frame. Sequence numbers start at 1 and never reset,
    /// so the guest can drop reordered frames across rematches too.
    pub fn snapshot(&mut self) -> StateSnapshot {
        self.seq += 1;
        normalize::encode(
            self.seq,
            &self.puck,
            self.own_paddle,
            self.tracker.rounds(),
            self.pause_marker,
            &self.field,
        )
    }

    pub fn view(&self) -> RenderView {
        RenderView {
            phase: self.tracker.phase(),
            puck: self.puck,
            own_paddle: self.own_paddle,
            opponent_paddle: self.opp_paddle,
            paddle_width: self.field.paddle_width(),
            rounds: self.tracker.rounds(),
            current_round: self.tracker.current_round(),
            pause_marker: self.pause_marker,
        }
    }
}

/// Drive the authoritative loop until the transport drops or the local
/// player leaves
pub(super) async fn run(
    config: SessionConfig,
    outbox: mpsc::Sender<ClientMsg>,
    mut inbox: mpsc::Receiver<ServerMsg>,
    mut commands: mpsc::Receiver<SessionCommand>,
    view_tx: watch::Sender<RenderView>,
) {
    let room_id = config.room_id;
    let mut core = HostCore::new(config.field, config.rules, config.rng_seed);

    let mut ticker = interval(tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut countdown = interval(COUNTDOWN_TICK);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // One-shot deadline for the inter-round freeze
    let pause_timer = sleep(PARKED);
    tokio::pin!(pause_timer);
    let mut pause_pending = false;

    let _ = view_tx.send(core.view());

    loop {
        tokio::select! {
            _ = ticker.tick(), if core.phase().is_playing() => {
                if let Some(side) = core.step() {
                    match core.goal(side) {
                        GoalVerdict::MatchOver(outcome) => {
                            info!(room_id = %room_id, outcome = ?outcome, "Match decided");
                            let msg = ClientMsg::MatchEnd {
                                room_id: room_id.clone(),
                                payload: MatchEndPayload { winner: outcome },
                            };
                            if !send_to_relay(&outbox, msg).await {
                                break;
                            }
                        }
                        GoalVerdict::PauseRound => {
                            // The marker rides out on the goal frame itself
                            let state = core.snapshot();
                            let msg = ClientMsg::State {
                                room_id: room_id.clone(),
                                state,
                            };
                            if !send_to_relay(&outbox, msg).await {
                                break;
                            }
                            pause_timer.as_mut().reset(Instant::now() + ROUND_PAUSE);
                            pause_pending = true;
                        }
                        GoalVerdict::Ignored => {}
                    }
                } else {
                    let state = core.snapshot();
                    let msg = ClientMsg::State {
                        room_id: room_id.clone(),
                        state,
                    };
                    if !send_to_relay(&outbox, msg).await {
                        break;
                    }
                }
                let _ = view_tx.send(core.view());
            }

            _ = countdown.tick(), if core.phase().is_countdown() => {
                if core.tick_countdown() {
                    ticker.reset();
                }
                let _ = view_tx.send(core.view());
            }

            _ = &mut pause_timer, if pause_pending => {
                pause_pending = false;
                let (rounds, current_round) = core.resume_round();
                let msg = ClientMsg::RoundEnd {
                    room_id: room_id.clone(),
                    payload: RoundEndPayload { rounds, current_round },
                };
                if !send_to_relay(&outbox, msg).await {
                    break;
                }
                ticker.reset();
                let _ = view_tx.send(core.view());
            }

            msg = inbox.recv() => {
                let Some(msg) = msg else {
                    debug!(room_id = %room_id, "Relay inbox closed");
                    break;
                };
                match msg {
                    ServerMsg::OpponentJoined => {
                        core.opponent_joined();
                        countdown.reset();
                        let _ = view_tx.send(core.view());
                    }
                    ServerMsg::OpponentLeft => {
                        core.opponent_left();
                        pause_pending = false;
                        info!(room_id = %room_id, "Opponent left, match abandoned");
                        let _ = view_tx.send(core.view());
                    }
                    ServerMsg::Paddle { paddle_pct, paddle_x } => {
                        if !core.apply_remote_paddle(paddle_pct, paddle_x) {
                            debug!(room_id = %room_id, "Refused remote paddle frame");
                        }
                    }
                    ServerMsg::PlayAgain => {
                        if core.play_again() {
                            countdown.reset();
                            let _ = view_tx.send(core.view());
                        }
                    }
                    ServerMsg::Error { code, message } => {
                        warn!(room_id = %room_id, code = %code, message = %message, "Relay error");
                    }
                    other => {
                        // Authoritative frames only ever flow host to guest
                        debug!(room_id = %room_id, msg = ?other, "Ignoring unexpected frame");
                    }
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(SessionCommand::Paddle(raw)) => {
                        let Some(fraction) = sanitize_fraction(raw) else {
                            continue;
                        };
                        core.set_own_paddle(fraction);
                        let msg = ClientMsg::Paddle {
                            room_id: room_id.clone(),
                            paddle_pct: Some(fraction),
                            paddle_x: None,
                        };
                        if !send_to_relay(&outbox, msg).await {
                            break;
                        }
                        let _ = view_tx.send(core.view());
                    }
                    Some(SessionCommand::PlayAgain) => {
                        if core.play_again() {
                            countdown.reset();
                            let msg = ClientMsg::PlayAgain {
                                room_id: room_id.clone(),
                            };
                            if !send_to_relay(&outbox, msg).await {
                                break;
                            }
                            let _ = view_tx.send(core.view());
                        }
                    }
                    Some(SessionCommand::Leave) | None => {
                        info!(room_id = %room_id, "Host session closing");
                        break;
                    }
                }
            }
        }
    }
}
