//! Shared simulation: geometry, puck physics, match rules, snapshot codec

pub mod field;
pub mod normalize;
pub mod physics;
pub mod rules;

pub use field::FieldSize;
pub use physics::{Puck, PuckPhysics};
pub use rules::{GoalVerdict, MatchRules, Phase, RoundTracker};
