//! Resolution-independent snapshot codec and the guest mirror transform
//!
//! The host encodes everything as fractions of its own field; the guest
//! mirrors the frame and materializes it against its own dimensions, so
//! the two peers never need matching resolutions.

use crate::game::field::{FieldSize, MARKER_BOTTOM_INSET, MARKER_MARGIN, MARKER_TOP_Y};
use crate::game::physics::Puck;
use crate::ws::protocol::{PauseMarker, PuckSnapshot, ScorePair, Side, StateSnapshot};

/// Absolute pause marker in local field units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPoint {
    pub side: Side,
    pub x: f64,
    pub y: f64,
}

/// Marker position for a goal scored by `side`, in the host's units:
/// pinned to the crossed edge, clamped away from the side walls.
pub fn marker_for_goal(side: Side, puck_x: f64, field: &FieldSize) -> MarkerPoint {
    let x = puck_x.clamp(MARKER_MARGIN, field.width - MARKER_MARGIN);
    let y = match side {
        Side::Own => MARKER_TOP_Y,
        Side::Opp => field.height - MARKER_BOTTOM_INSET,
    };
    MarkerPoint { side, x, y }
}

/// Encode host state into a normalized frame
pub fn encode(
    seq: u64,
    puck: &Puck,
    paddle_offset: f64,
    rounds: ScorePair,
    marker: Option<MarkerPoint>,
    field: &FieldSize,
) -> StateSnapshot {
    StateSnapshot {
        seq,
        puck: PuckSnapshot {
            x: puck.x / field.width,
            y: puck.y / field.height,
            dx: puck.dx / field.width,
            dy: puck.dy / field.height,
        },
        host_paddle_pct: paddle_offset / field.paddle_travel(),
        paddle_w_pct: field.paddle_width() / field.width,
        rounds,
        pause_marker: marker.map(|m| PauseMarker {
            side: m.side,
            x: m.x / field.width,
            y: m.y / field.height,
        }),
    }
}

/// Flip a normalized frame into the other perspective: vertical flip plus
/// score and marker ownership swap. Applying it twice is the identity.
pub fn mirror(snap: &StateSnapshot) -> StateSnapshot {
    StateSnapshot {
        seq: snap.seq,
        puck: PuckSnapshot {
            x: snap.puck.x,
            y: 1.0 - snap.puck.y,
            dx: snap.puck.dx,
            dy: -snap.puck.dy,
        },
        host_paddle_pct: snap.host_paddle_pct,
        paddle_w_pct: snap.paddle_w_pct,
        rounds: snap.rounds.swapped(),
        pause_marker: snap.pause_marker.map(|m| PauseMarker {
            side: m.side.swapped(),
            x: m.x,
            y: 1.0 - m.y,
        }),
    }
}

/// A host frame mirrored and materialized in the receiver's field units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedState {
    pub puck: Puck,
    /// Offset of the opponent paddle drawn along the top edge
    pub top_paddle: f64,
    /// Paddle width implied by the sender's width ratio
    pub paddle_width: f64,
    pub rounds: ScorePair,
    pub pause_marker: Option<MarkerPoint>,
}

/// Mirror a host frame and scale it to the receiver's own field
pub fn decode(snap: &StateSnapshot, field: &FieldSize) -> DecodedState {
    let m = mirror(snap);
    let paddle_width = m.paddle_w_pct * field.width;

    DecodedState {
        puck: Puck {
            x: m.puck.x * field.width,
            y: m.puck.y * field.height,
            dx: m.puck.dx * field.width,
            dy: m.puck.dy * field.height,
        },
        top_paddle: m.host_paddle_pct * (field.width - paddle_width),
        paddle_width,
        rounds: m.rounds,
        pause_marker: m.pause_marker.map(|pm| MarkerPoint {
            side: pm.side,
            x: pm.x * field.width,
            y: pm.y * field.height,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn sample_snapshot() -> StateSnapshot {
        StateSnapshot {
            seq: 9,
            puck: PuckSnapshot {
                x: 0.31,
                y: 0.62,
                dx: 0.004,
                dy: -0.007,
            },
            host_paddle_pct: 0.8,
            paddle_w_pct: 0.28,
            rounds: ScorePair { own: 2, opp: 1 },
            pause_marker: Some(PauseMarker {
                side: Side::Own,
                x: 0.5,
                y: 0.033,
            }),
        }
    }

    #[test]
    fn mirror_is_an_involution() {
        let snap = sample_snapshot();
        let twice = mirror(&mirror(&snap));

        assert_eq!(twice.seq, snap.seq);
        assert!((twice.puck.x - snap.puck.x).abs() < EPS);
        assert!((twice.puck.y - snap.puck.y).abs() < EPS);
        assert!((twice.puck.dx - snap.puck.dx).abs() < EPS);
        assert!((twice.puck.dy - snap.puck.dy).abs() < EPS);
        assert_eq!(twice.rounds, snap.rounds);

        let marker = twice.pause_marker.unwrap();
        let original = snap.pause_marker.unwrap();
        assert_eq!(marker.side, original.side);
        assert!((marker.y - original.y).abs() < EPS);
    }

    #[test]
    fn mirror_flips_the_vertical_axis_and_perspective() {
        let snap = sample_snapshot();
        let m = mirror(&snap);

        assert!((m.puck.y - 0.38).abs() < EPS);
        assert!((m.puck.dy - 0.007).abs() < EPS);
        assert!((m.puck.x - snap.puck.x).abs() < EPS);
        assert_eq!(m.rounds, ScorePair { own: 1, opp: 2 });
        assert_eq!(m.pause_marker.unwrap().side, Side::Opp);
    }

    #[test]
    fn encode_then_decode_preserves_fractions_across_field_sizes() {
        let host = FieldSize::new(1280.0, 720.0);
        let guest = FieldSize::new(390.0, 844.0);

        let puck = Puck {
            x: 0.3 * host.width,
            y: 0.6 * host.height,
            dx: 4.0,
            dy: -3.0,
        };
        let snap = encode(
            1,
            &puck,
            0.5 * host.paddle_travel(),
            ScorePair { own: 1, opp: 0 },
            None,
            &host,
        );
        let decoded = decode(&snap, &guest);

        // Same horizontal fraction, mirrored vertical fraction
        assert!((decoded.puck.x / guest.width - 0.3).abs() < EPS);
        assert!((decoded.puck.y / guest.height - 0.4).abs() < EPS);
        assert!((decoded.puck.dx / guest.width - 4.0 / host.width).abs() < EPS);
        // Host dy of -3 (upward) mirrors into downward motion for the guest
        assert!((decoded.puck.dy / guest.height - 3.0 / host.height).abs() < EPS);

        // Scores arrive in the receiver's perspective
        assert_eq!(decoded.rounds, ScorePair { own: 0, opp: 1 });
    }

    #[test]
    fn decode_derives_the_paddle_from_the_senders_ratio() {
        let host = FieldSize::new(1000.0, 700.0);
        let guest = FieldSize::new(500.0, 900.0);

        let puck = Puck {
            x: 500.0,
            y: 350.0,
            dx: 3.0,
            dy: 3.0,
        };
        // Host paddle parked at the right end of its travel
        let snap = encode(
            1,
            &puck,
            host.paddle_travel(),
            ScorePair::default(),
            None,
            &host,
        );
        let decoded = decode(&snap, &guest);

        let expected_width = snap.paddle_w_pct * guest.width;
        assert!((decoded.paddle_width - expected_width).abs() < EPS);
        assert!((decoded.top_paddle - (guest.width - expected_width)).abs() < 1e-9);
    }

    #[test]
    fn marker_is_pinned_to_the_crossed_edge_and_clamped() {
        let field = FieldSize::new(800.0, 600.0);

        let own = marker_for_goal(Side::Own, -40.0, &field);
        assert_eq!(own.x, MARKER_MARGIN);
        assert_eq!(own.y, MARKER_TOP_Y);

        let opp = marker_for_goal(Side::Opp, 900.0, &field);
        assert_eq!(opp.x, field.width - MARKER_MARGIN);
        assert_eq!(opp.y, field.height - MARKER_BOTTOM_INSET);
    }

    #[test]
    fn marker_survives_the_wire_in_the_receivers_units() {
        let host = FieldSize::new(800.0, 600.0);
        let guest = FieldSize::new(400.0, 300.0);

        let marker = marker_for_goal(Side::Own, 400.0, &host);
        let puck = Puck {
            x: 400.0,
            y: 10.0,
            dx: 0.0,
            dy: -3.0,
        };
        let snap = encode(
            2,
            &puck,
            0.0,
            ScorePair { own: 1, opp: 0 },
            Some(marker),
            &host,
        );
        let decoded = decode(&snap, &guest).pause_marker.unwrap();

        assert_eq!(decoded.side, Side::Opp);
        assert!((decoded.x - 200.0).abs() < EPS);
        // Top marker for the host lands near the guest's bottom edge
        assert!((decoded.y - (1.0 - MARKER_TOP_Y / host.height) * guest.height).abs() < 1e-9);
    }
}
