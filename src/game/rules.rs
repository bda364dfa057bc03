//! Round and match progression rules

use std::cmp::Ordering;

use crate::ws::protocol::{MatchOutcome, ScorePair, Side};

/// Seconds counted down before play starts
pub const COUNTDOWN_START: u8 = 3;

/// Win conditions for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    /// A side wins outright at this many rounds
    pub rounds_to_win: u8,
    /// Hard cap on rounds played; at the cap the higher count wins
    pub max_rounds: u8,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            rounds_to_win: 3,
            max_rounds: 5,
        }
    }
}

impl MatchRules {
    /// Terminal outcome implied by the scoreboard, if any
    pub fn verdict(&self, rounds: ScorePair) -> Option<MatchOutcome> {
        let threshold =
            rounds.own >= self.rounds_to_win || rounds.opp >= self.rounds_to_win;
        let capped = rounds.total() >= self.max_rounds;
        if !threshold && !capped {
            return None;
        }

        Some(match rounds.own.cmp(&rounds.opp) {
            Ordering::Greater => MatchOutcome::You,
            Ordering::Less => MatchOutcome::Opponent,
            Ordering::Equal => MatchOutcome::Tie,
        })
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Alone in the room
    Waiting,
    /// Pre-round countdown ticking at 1 Hz
    Countdown { remaining: u8 },
    /// Puck in motion
    Playing,
    /// Freeze between a goal and the next serve
    RoundPaused,
    /// Match finished
    Over { outcome: MatchOutcome },
}

impl Phase {
    pub fn is_playing(&self) -> bool {
        matches!(self, Phase::Playing)
    }

    pub fn is_countdown(&self) -> bool {
        matches!(self, Phase::Countdown { .. })
    }

    pub fn is_over(&self) -> bool {
        matches!(self, Phase::Over { .. })
    }
}

/// What a recorded goal means for the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalVerdict {
    /// Freeze, then the next round
    PauseRound,
    /// The match is decided
    MatchOver(MatchOutcome),
    /// Not playing; nothing changed
    Ignored,
}

/// Round and match progression, shared by both roles. Only the host ever
/// records goals; the guest mirrors its transitions from relayed events.
#[derive(Debug, Clone)]
pub struct RoundTracker {
    rules: MatchRules,
    rounds: ScorePair,
    current_round: u8,
    phase: Phase,
}

impl RoundTracker {
    pub fn new(rules: MatchRules) -> Self {
        Self {
            rules,
            rounds: ScorePair::default(),
            current_round: 1,
            phase: Phase::Waiting,
        }
    }

    pub fn rules(&self) -> MatchRules {
        self.rules
    }

    pub fn rounds(&self) -> ScorePair {
        self.rounds
    }

    pub fn current_round(&self) -> u8 {
        self.current_round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// A counterpart arrived. Starts the pre-match countdown, or restarts
    /// the match when a new opponent fills a seat after a finished one.
    /// Returns true when a fresh match begins; mid-match arrivals cannot
    /// happen because the room is full.
    pub fn opponent_ready(&mut self) -> bool {
        match self.phase {
            Phase::Waiting | Phase::Over { .. } => {
                self.rounds = ScorePair::default();
                self.current_round = 1;
                self.phase = Phase::Countdown {
                    remaining: COUNTDOWN_START,
                };
                true
            }
            _ => false,
        }
    }

    /// One 1 Hz countdown step. Returns true the moment play starts.
    pub fn tick_countdown(&mut self) -> bool {
        if let Phase::Countdown { remaining } = self.phase {
            let next = remaining.saturating_sub(1);
            if next == 0 {
                self.phase = Phase::Playing;
                return true;
            }
            self.phase = Phase::Countdown { remaining: next };
        }
        false
    }

    /// Record a goal for `side` and evaluate the match. Goals outside
    /// `Playing` are ignored so a late tick cannot double-score.
    pub fn record_goal(&mut self, side: Side) -> GoalVerdict {
        if !self.phase.is_playing() {
            return GoalVerdict::Ignored;
        }

        match side {
            Side::Own => self.rounds.own += 1,
            Side::Opp => self.rounds.opp += 1,
        }

        match self.rules.verdict(self.rounds) {
            Some(outcome) => {
                self.phase = Phase::Over { outcome };
                GoalVerdict::MatchOver(outcome)
            }
            None => {
                self.phase = Phase::RoundPaused;
                GoalVerdict::PauseRound
            }
        }
    }

    /// Enter the inter-round freeze from play (guest side, on seeing a
    /// pause marker)
    pub fn enter_pause(&mut self) {
        if self.phase.is_playing() {
            self.phase = Phase::RoundPaused;
        }
    }

    /// End the inter-round freeze. Advances the round counter, capped at
    /// the rules' maximum, and returns the new round number.
    pub fn resume(&mut self) -> u8 {
        if matches!(self.phase, Phase::RoundPaused) {
            self.current_round = (self.current_round + 1).min(self.rules.max_rounds);
            self.phase = Phase::Playing;
        }
        self.current_round
    }

    /// The counterpart disconnected; terminal from any phase
    pub fn force_abandon(&mut self) {
        self.phase = Phase::Over {
            outcome: MatchOutcome::OpponentLeft,
        };
    }

    /// Apply a relayed terminal outcome (guest side, already swapped into
    /// the local perspective)
    pub fn finish(&mut self, outcome: MatchOutcome) {
        self.phase = Phase::Over { outcome };
    }

    /// Adopt a relayed scoreboard without touching the phase (guest side,
    /// already swapped)
    pub fn sync_scores(&mut self, rounds: ScorePair) {
        self.rounds = rounds;
    }

    /// Apply relayed round-end bookkeeping (guest side, already swapped)
    pub fn sync_round(&mut self, rounds: ScorePair, current_round: u8) {
        self.rounds = rounds;
        self.current_round = current_round;
        if matches!(self.phase, Phase::RoundPaused | Phase::Playing) {
            self.phase = Phase::Playing;
        }
    }

    /// Rematch from the terminal screen. Refused while the match is live
    /// or once the counterpart is gone.
    pub fn reset(&mut self) -> bool {
        match self.phase {
            Phase::Over {
                outcome: MatchOutcome::OpponentLeft,
            } => false,
            Phase::Over { .. } => {
                self.rounds = ScorePair::default();
                self.current_round = 1;
                self.phase = Phase::Countdown {
                    remaining: COUNTDOWN_START,
                };
                true
            }
            _ => false,
        }
    }
}
