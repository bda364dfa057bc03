//! Puck Duel - two-peer realtime session engine and relay
//!
//! One peer per room hosts the authoritative simulation; the other mirrors
//! relayed snapshots into its own field units. The relay routes JSON text
//! frames between the two seats of a room and never interprets game state.
//! Everything on the wire is normalized to field fractions, so peers with
//! different resolutions stay in perfect agreement.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod room;
pub mod session;
pub mod util;
pub mod ws;

pub use app::AppState;
pub use config::Config;
pub use http::build_router;
