//! Selection stage offsets for paired drawings

use crate::controller::payload::ControllerEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Bounded 2-D offset of a drawing on the selection stage
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Per-axis clamp range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for StageBounds {
    fn default() -> Self {
        Self {
            min: -40.0,
            max: 40.0,
        }
    }
}

impl StageBounds {
    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stage {
    bounds: StageBounds,
    positions: HashMap<String, Position>,
}

impl Stage {
    pub fn new(bounds: StageBounds) -> Self {
        Self {
            bounds,
            positions: HashMap::new(),
        }
    }

    /// Puts a drawing back at the centre
    pub fn center(&mut self, drawing_id: &str) {
        self.positions
            .insert(drawing_id.to_string(), Position::default());
    }

    pub fn remove(&mut self, drawing_id: &str) {
        self.positions.remove(drawing_id);
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn position(&self, drawing_id: &str) -> Position {
        self.positions.get(drawing_id).copied().unwrap_or_default()
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    /// Moves a drawing by the event's displacement, or by its direction token
    /// times `step` when no displacement is present. Returns the new position,
    /// or `None` if the event carries no usable direction.
    pub fn apply_move(&mut self, drawing_id: &str, event: &ControllerEvent) -> Option<Position> {
        let (dx, dy) = if !event.axis.is_empty() {
            (event.axis.dx.unwrap_or(0.0), event.axis.dy.unwrap_or(0.0))
        } else {
            let (ux, uy) = direction(event.button.as_deref()?)?;
            (ux * event.step, uy * event.step)
        };

        let bounds = self.bounds;
        let position = self.positions.entry(drawing_id.to_string()).or_default();
        position.x = bounds.clamp(position.x + dx);
        position.y = bounds.clamp(position.y + dy);

        debug!(
            "Drawing {} moved to ({:.1}, {:.1})",
            drawing_id, position.x, position.y
        );
        Some(*position)
    }
}

// Screen coordinates: y grows downwards
fn direction(token: &str) -> Option<(f64, f64)> {
    match token {
        "up" | "w" => Some((0.0, -1.0)),
        "down" | "s" => Some((0.0, 1.0)),
        "left" | "a" => Some((-1.0, 0.0)),
        "right" | "d" => Some((1.0, 0.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::payload::normalize;

    #[test]
    fn button_moves_by_step() {
        let mut stage = Stage::new(StageBounds::default());
        stage.center("d1");
        let moved = stage.apply_move("d1", &normalize(b"right", "base/player1"));
        assert_eq!(moved, Some(Position { x: 6.0, y: 0.0 }));
        let moved = stage.apply_move("d1", &normalize(br#"{"button":"up","step":2}"#, "t"));
        assert_eq!(moved, Some(Position { x: 6.0, y: -2.0 }));
    }

    #[test]
    fn axis_wins_over_button() {
        let mut stage = Stage::new(StageBounds::default());
        let moved = stage.apply_move("d1", &normalize(br#"{"dx":3,"button":"left"}"#, "t"));
        assert_eq!(moved, Some(Position { x: 3.0, y: 0.0 }));
    }

    #[test]
    fn positions_are_clamped() {
        let mut stage = Stage::new(StageBounds::default());
        for _ in 0..20 {
            stage.apply_move("d1", &normalize(b"left", "t"));
        }
        assert_eq!(stage.position("d1"), Position { x: -40.0, y: 0.0 });
        stage.apply_move("d1", &normalize(br#"{"dy":500}"#, "t"));
        assert_eq!(stage.position("d1").y, 40.0);
    }

    #[test]
    fn unknown_token_is_ignored() {
        let mut stage = Stage::new(StageBounds::default());
        assert_eq!(stage.apply_move("d1", &normalize(b"jump", "t")), None);
        assert!(stage.positions().is_empty());
    }
}
