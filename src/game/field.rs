//! Field geometry shared by both peers
//!
//! Every peer plays on its own absolute field; only fractions of these
//! dimensions ever cross the wire.

/// Puck radius in local field units
pub const PUCK_RADIUS: f64 = 12.0;

/// Thickness of the collision strip along each goal edge
pub const PADDLE_BAND: f64 = 30.0;

/// Paddle width as a fraction of the field width
pub const PADDLE_WIDTH_RATIO: f64 = 0.28;

/// Horizontal velocity gained per unit of off-center paddle contact
pub const DEFLECT_GAIN: f64 = 0.6;

/// Speed multiplier applied on every paddle hit
pub const SPEED_RAMP: f64 = 1.03;

/// Base per-axis serve speed
pub const SERVE_SPEED: f64 = 3.0;

/// Upper bound of the random pace added to each serve axis
pub const SERVE_JITTER: f64 = 1.2;

/// Pause marker keeps this margin from the side walls
pub const MARKER_MARGIN: f64 = 12.0;

/// Marker height when the puck crossed the top edge
pub const MARKER_TOP_Y: f64 = 20.0;

/// Marker inset from the bottom edge when the puck crossed it
pub const MARKER_BOTTOM_INSET: f64 = 34.0;

/// One peer's local playing field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSize {
    pub width: f64,
    pub height: f64,
}

impl FieldSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Local paddle width, rounded to whole units
    pub fn paddle_width(&self) -> f64 {
        (self.width * PADDLE_WIDTH_RATIO).round()
    }

    /// Horizontal travel available to a paddle's left edge. Floored at one
    /// unit so degenerate fields never divide by zero.
    pub fn paddle_travel(&self) -> f64 {
        (self.width - self.paddle_width()).max(1.0)
    }

    /// Paddle offset that centers it horizontally
    pub fn centered_paddle(&self) -> f64 {
        (self.width - self.paddle_width()) / 2.0
    }

    pub fn center_x(&self) -> f64 {
        self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.height / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paddle_width_rounds_to_whole_units() {
        let field = FieldSize::new(390.0, 700.0);
        assert_eq!(field.paddle_width(), 109.0); // 390 * 0.28 = 109.2
    }

    #[test]
    fn paddle_travel_never_collapses() {
        let tiny = FieldSize::new(1.0, 1.0);
        assert_eq!(tiny.paddle_travel(), 1.0);

        let field = FieldSize::new(800.0, 600.0);
        assert_eq!(field.paddle_travel(), 800.0 - field.paddle_width());
    }

    #[test]
    fn centered_paddle_splits_travel_evenly() {
        let field = FieldSize::new(800.0, 600.0);
        let offset = field.centered_paddle();
        assert!((offset + field.paddle_width() / 2.0 - field.center_x()).abs() < 1e-9);
    }
}
