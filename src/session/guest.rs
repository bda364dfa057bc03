//! Guest mirror loop
//!
//! The guest never simulates. It mirrors relayed host frames into its own
//! field units, keeps a local countdown so the overlay ticks without
//! round trips, and sends its paddle input back through the relay.

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::field::FieldSize;
use crate::game::normalize::{self, MarkerPoint};
use crate::game::physics::Puck;
use crate::game::rules::{MatchRules, Phase, RoundTracker};
use crate::util::time::COUNTDOWN_TICK;
use crate::ws::protocol::{ClientMsg, MatchOutcome, ScorePair, ServerMsg, StateSnapshot};

use super::{sanitize_fraction, send_to_relay, RenderView, SessionCommand, SessionConfig};

/// Mirrored state on the guest peer, independent of the loop driving it.
/// Everything here is in the guest's own field units and perspective.
pub struct GuestView {
    field: FieldSize,
    tracker: RoundTracker,
    puck: Puck,
    own_paddle: f64,
    top_paddle: f64,
    /// Width decoded from the host's ratio; starts from the local estimate
    /// until the first frame lands
    paddle_width: f64,
    pause_marker: Option<MarkerPoint>,
    last_seq: u64,
}

impl GuestView {
    pub fn new(field: FieldSize, rules: MatchRules) -> Self {
        Self {
            field,
            tracker: RoundTracker::new(rules),
            puck: Puck::centered(&field),
            own_paddle: field.centered_paddle(),
            top_paddle: field.centered_paddle(),
            paddle_width: field.paddle_width(),
            pause_marker: None,
            last_seq: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    pub fn opponent_joined(&mut self) {
        if self.tracker.opponent_ready() {
            self.pause_marker = None;
            self.puck = Puck::centered(&self.field);
            self.top_paddle = self.field.centered_paddle();
        }
    }

    pub fn tick_countdown(&mut self) -> bool {
        self.tracker.tick_countdown()
    }

    /// Mirror a relayed frame into local units. Returns false when the
    /// frame is stale and was dropped.
    pub fn apply_snapshot(&mut self, snap: &StateSnapshot) -> bool {
        if snap.seq <= self.last_seq {
            return false;
        }
        self.last_seq = snap.seq;

        let decoded = normalize::decode(snap, &self.field);
        self.puck = decoded.puck;
        self.top_paddle = decoded.top_paddle;
        self.paddle_width = decoded.paddle_width;
        self.tracker.sync_scores(decoded.rounds);
        self.pause_marker = decoded.pause_marker;
        if decoded.pause_marker.is_some() {
            self.tracker.enter_pause();
        }
        true
    }

    /// Relayed round-end bookkeeping. The payload arrives in the host's
    /// perspective and is swapped here.
    pub fn round_end(&mut self, rounds: ScorePair, current_round: u8) {
        self.pause_marker = None;
        self.tracker.sync_round(rounds.swapped(), current_round);
    }

    /// Relayed terminal outcome, swapped into the local perspective
    pub fn match_end(&mut self, winner: MatchOutcome) {
        self.tracker.finish(winner.swapped());
    }

    pub fn opponent_left(&mut self) {
        self.tracker.force_abandon();
    }

    /// Rematch from the terminal screen. Returns false when refused.
    pub fn play_again(&mut self) -> bool {
        if !self.tracker.reset() {
            return false;
        }
        self.pause_marker = None;
        self.puck = Puck::centered(&self.field);
        self.top_paddle = self.field.centered_paddle();
        true
    }

    /// Move the bottom paddle to a sanitized fraction of its travel. The
    /// travel tracks the decoded width so both peers agree on the range.
    pub fn set_own_paddle(&mut self, fraction: f64) {
        self.own_paddle = fraction * (self.field.width - self.paddle_width);
    }

    pub fn view(&self) -> RenderView {
        RenderView {
            phase: self.tracker.phase(),
            puck: self.puck,
            own_paddle: self.own_paddle,
            opponent_paddle: self.top_paddle,
            paddle_width: self.paddle_width,
            rounds: self.tracker.rounds(),
            current_round: self.tracker.current_round(),
            pause_marker: self.pause_marker,
        }
    }
}

/// Drive the mirror loop until the transport drops or the local player
/// leaves
pub(super) async fn run(
    config: SessionConfig,
    outbox: mpsc::Sender<ClientMsg>,
    mut inbox: mpsc::Receiver<ServerMsg>,
    mut commands: mpsc::Receiver<SessionCommand>,
    view_tx: watch::Sender<RenderView>,
) {
    let room_id = config.room_id;
    let mut view = GuestView::new(config.field, config.rules);

    let mut countdown = interval(COUNTDOWN_TICK);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let _ = view_tx.send(view.view());

    loop {
        tokio::select! {
            _ = countdown.tick(), if view.phase().is_countdown() => {
                view.tick_countdown();
                let _ = view_tx.send(view.view());
            }

            msg = inbox.recv() => {
                let Some(msg) = msg else {
                    debug!(room_id = %room_id, "Relay inbox closed");
                    break;
                };
                match msg {
                    ServerMsg::State { state } => {
                        if view.apply_snapshot(&state) {
                            let _ = view_tx.send(view.view());
                        } else {
                            debug!(room_id = %room_id, seq = state.seq, "Dropped stale frame");
                        }
                    }
                    ServerMsg::RoundEnd { rounds, current_round } => {
                        view.round_end(rounds, current_round);
                        let _ = view_tx.send(view.view());
                    }
                    ServerMsg::MatchEnd { winner } => {
                        view.match_end(winner);
                        info!(room_id = %room_id, outcome = ?winner, "Match decided");
                        let _ = view_tx.send(view.view());
                    }
                    ServerMsg::OpponentJoined => {
                        view.opponent_joined();
                        countdown.reset();
                        let _ = view_tx.send(view.view());
                    }
                    ServerMsg::OpponentLeft => {
                        view.opponent_left();
                        info!(room_id = %room_id, "Opponent left, match abandoned");
                        let _ = view_tx.send(view.view());
                    }
                    ServerMsg::PlayAgain => {
                        if view.play_again() {
                            countdown.reset();
                            let _ = view_tx.send(view.view());
                        }
                    }
                    ServerMsg::Paddle { .. } => {
                        // The top paddle rides in on state frames instead
                    }
                    ServerMsg::Error { code, message } => {
                        warn!(room_id = %room_id, code = %code, message = %message, "Relay error");
                    }
                    ServerMsg::Role { .. } => {}
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(SessionCommand::Paddle(raw)) => {
                        let Some(fraction) = sanitize_fraction(raw) else {
                            continue;
                        };
                        view.set_own_paddle(fraction);
                        let msg = ClientMsg::Paddle {
                            room_id: room_id.clone(),
                            paddle_pct: Some(fraction),
                            paddle_x: None,
                        };
                        if !send_to_relay(&outbox, msg).await {
                            break;
                        }
                        let _ = view_tx.send(view.view());
                    }
                    Some(SessionCommand::PlayAgain) => {
                        if view.play_again() {
                            countdown.reset();
                            let msg = ClientMsg::PlayAgain {
                                room_id: room_id.clone(),
                            };
                            if !send_to_relay(&outbox, msg).await {
                                break;
                            }
                            let _ = view_tx.send(view.view());
                        }
                    }
                    Some(SessionCommand::Leave) | None => {
                        info!(room_id = %room_id, "Guest session closing");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::field::MARKER_TOP_Y;
    use crate::ws::protocol::Side;

    const EPS: f64 = 1e-9;

    fn host_field() -> FieldSize {
        FieldSize::new(800.0, 600.0)
    }

    fn guest() -> GuestView {
        let mut g = GuestView::new(FieldSize::new(390.0, 700.0), MatchRules::default());
        g.opponent_joined();
        while !g.phase().is_playing() {
            g.tick_countdown();
        }
        g
    }

    fn host_frame(seq: u64, puck: Puck, rounds: ScorePair) -> StateSnapshot {
        normalize::encode(seq, &puck, 100.0, rounds, None, &host_field())
    }

    #[test]
    fn stale_frames_are_dropped() {
        let mut g = guest();
        let puck = Puck {
            x: 200.0,
            y: 150.0,
            dx: 2.0,
            dy: -3.0,
        };

        assert!(g.apply_snapshot(&host_frame(2, puck, ScorePair::default())));
        let frozen = g.view();

        let moved = Puck {
            x: 500.0,
            ..puck
        };
        assert!(!g.apply_snapshot(&host_frame(1, moved, ScorePair::default())));
        assert_eq!(g.view(), frozen);

        assert!(g.apply_snapshot(&host_frame(3, moved, ScorePair::default())));
    }

    #[test]
    fn frames_mirror_into_local_units() {
        let mut g = guest();
        let puck = Puck {
            x: 200.0,
            y: 150.0,
            dx: 2.0,
            dy: -3.0,
        };
        g.apply_snapshot(&host_frame(1, puck, ScorePair { own: 1, opp: 0 }));

        let view = g.view();
        assert!((view.puck.x - 200.0 / 800.0 * 390.0).abs() < EPS);
        assert!((view.puck.y - (1.0 - 150.0 / 600.0) * 700.0).abs() < EPS);
        assert!((view.puck.dy - 3.0 / 600.0 * 700.0).abs() < EPS);

        // Host's 1-0 lead reads 0-1 from this side
        assert_eq!(view.rounds, ScorePair { own: 0, opp: 1 });

        // Paddle width follows the sender's ratio, not the local estimate
        assert!((view.paddle_width - 0.28 * 390.0).abs() < EPS);
        let travel = 390.0 - view.paddle_width;
        let host_travel = 800.0 - host_field().paddle_width();
        assert!((view.opponent_paddle - 100.0 / host_travel * travel).abs() < EPS);
    }

    #[test]
    fn marker_frame_freezes_the_guest() {
        let mut g = guest();
        let puck = Puck {
            x: 700.0,
            y: 8.0,
            dx: 2.0,
            dy: -4.0,
        };
        let marker = normalize::marker_for_goal(Side::Own, puck.x, &host_field());
        let snap = normalize::encode(
            1,
            &puck,
            100.0,
            ScorePair { own: 1, opp: 0 },
            Some(marker),
            &host_field(),
        );

        assert!(g.apply_snapshot(&snap));
        assert_eq!(g.phase(), Phase::RoundPaused);

        // Host scored at its top edge, so the marker lands near this
        // side's bottom edge, attributed to the opponent
        let local = g.view().pause_marker.unwrap();
        assert_eq!(local.side, Side::Opp);
        assert!((local.y - (1.0 - MARKER_TOP_Y / 600.0) * 700.0).abs() < EPS);
    }

    #[test]
    fn round_end_swaps_the_scoreboard_and_resumes() {
        let mut g = guest();
        let marker = normalize::marker_for_goal(Side::Own, 300.0, &host_field());
        let snap = normalize::encode(
            1,
            &Puck::centered(&host_field()),
            100.0,
            ScorePair { own: 2, opp: 1 },
            Some(marker),
            &host_field(),
        );
        g.apply_snapshot(&snap);
        assert_eq!(g.phase(), Phase::RoundPaused);

        g.round_end(ScorePair { own: 2, opp: 1 }, 4);

        let view = g.view();
        assert!(view.phase.is_playing());
        assert_eq!(view.rounds, ScorePair { own: 1, opp: 2 });
        assert_eq!(view.current_round, 4);
        assert!(view.pause_marker.is_none());
    }

    #[test]
    fn match_end_swaps_the_winner() {
        let mut g = guest();
        g.match_end(MatchOutcome::You);
        assert_eq!(
            g.phase(),
            Phase::Over {
                outcome: MatchOutcome::Opponent
            }
        );

        let mut tied = guest();
        tied.match_end(MatchOutcome::Tie);
        assert_eq!(
            tied.phase(),
            Phase::Over {
                outcome: MatchOutcome::Tie
            }
        );
    }

    #[test]
    fn own_paddle_travel_follows_the_decoded_width() {
        let mut g = guest();

        // Before any frame the local estimate rules
        g.set_own_paddle(1.0);
        let local_width = FieldSize::new(390.0, 700.0).paddle_width();
        assert!((g.view().own_paddle - (390.0 - local_width)).abs() < EPS);

        g.apply_snapshot(&host_frame(1, Puck::centered(&host_field()), ScorePair::default()));
        g.set_own_paddle(1.0);
        assert!((g.view().own_paddle - (390.0 - 0.28 * 390.0)).abs() < EPS);
    }

    #[test]
    fn rematch_only_after_a_decided_match() {
        let mut g = guest();
        assert!(!g.play_again());

        g.match_end(MatchOutcome::You);
        assert!(g.play_again());
        assert_eq!(g.phase(), Phase::Countdown { remaining: 3 });

        let mut abandoned = guest();
        abandoned.opponent_left();
        assert!(!abandoned.play_again());
    }
}
