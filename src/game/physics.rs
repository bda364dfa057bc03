//! Host-side puck integration
//!
//! Runs only on the host peer; the guest never simulates. All positions
//! are in the host's local field units.

use rand::Rng;

use crate::game::field::{
    FieldSize, DEFLECT_GAIN, PADDLE_BAND, PUCK_RADIUS, SERVE_JITTER, SERVE_SPEED, SPEED_RAMP,
};
use crate::ws::protocol::Side;

/// Absolute puck state: position plus per-tick velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Puck {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Puck {
    /// Idle pre-match state: centered, gentle diagonal drift
    pub fn centered(field: &FieldSize) -> Self {
        Self {
            x: field.center_x(),
            y: field.center_y(),
            dx: SERVE_SPEED,
            dy: SERVE_SPEED,
        }
    }
}

/// Stateless puck integration
pub struct PuckPhysics;

impl PuckPhysics {
    /// Advance the puck by one tick and resolve collisions in order:
    /// side walls, bottom paddle, top paddle. Returns who scored when the
    /// puck crossed a goal edge.
    pub fn step(
        puck: &mut Puck,
        field: &FieldSize,
        bottom_paddle: f64,
        top_paddle: f64,
        paddle_width: f64,
        speed_mult: &mut f64,
    ) -> Option<Side> {
        puck.x += puck.dx * *speed_mult;
        puck.y += puck.dy * *speed_mult;

        if puck.x - PUCK_RADIUS < 0.0 {
            puck.x = PUCK_RADIUS;
            puck.dx = -puck.dx;
        }
        if puck.x + PUCK_RADIUS > field.width {
            puck.x = field.width - PUCK_RADIUS;
            puck.dx = -puck.dx;
        }

        // Bottom paddle (the host's own)
        let band_top = field.height - PADDLE_BAND;
        if puck.y + PUCK_RADIUS >= band_top
            && puck.y + PUCK_RADIUS <= band_top + PADDLE_BAND
            && puck.x >= bottom_paddle
            && puck.x <= bottom_paddle + paddle_width
        {
            puck.y = band_top - PUCK_RADIUS;
            puck.dy = -puck.dy.abs();
            Self::deflect(puck, bottom_paddle, paddle_width);
            *speed_mult *= SPEED_RAMP;
        }

        // Top paddle (the remote player's), offset kept inside the field
        let top = top_paddle.clamp(0.0, (field.width - paddle_width).max(0.0));
        if puck.y - PUCK_RADIUS <= PADDLE_BAND
            && puck.y - PUCK_RADIUS >= 0.0
            && puck.x >= top
            && puck.x <= top + paddle_width
        {
            puck.y = PADDLE_BAND + PUCK_RADIUS;
            puck.dy = puck.dy.abs();
            Self::deflect(puck, top, paddle_width);
            *speed_mult *= SPEED_RAMP;
        }

        if puck.y - PUCK_RADIUS <= 0.0 {
            // Past the top paddle: the host scored
            Some(Side::Own)
        } else if puck.y + PUCK_RADIUS >= field.height {
            Some(Side::Opp)
        } else {
            None
        }
    }

    /// Angle the puck away from the paddle center and keep it lively
    fn deflect(puck: &mut Puck, paddle: f64, paddle_width: f64) {
        let rel = (puck.x - (paddle + paddle_width / 2.0)) / (paddle_width / 2.0);
        puck.dx += rel * DEFLECT_GAIN;
    }

    /// Fresh serve velocity: independent random direction and pace per axis
    pub fn serve_velocity<R: Rng>(rng: &mut R) -> (f64, f64) {
        (Self::serve_axis(rng), Self::serve_axis(rng))
    }

    fn serve_axis<R: Rng>(rng: &mut R) -> f64 {
        let dir = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        dir * (SERVE_SPEED + rng.gen::<f64>() * SERVE_JITTER)
    }
}
