//! Bouncing motion for everything drawn on the saver screen.

use rand::Rng;

use super::art::Facing;

/// Which walls were hit during one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounce {
    pub horizontal: bool,
    pub vertical: bool,
}

/// A rectangle moving diagonally at a fixed speed.
///
/// Coordinates are fractional so slow objects only move every few frames.
/// Valid positions are `1 .. max` on both axes, where `max` is the screen
/// size minus the object size.
#[derive(Debug, Clone)]
pub struct Sprite {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    max_x: f32,
    max_y: f32,
}

impl Sprite {
    /// Random start position and random diagonal direction.
    ///
    /// The caller guarantees the object leaves at least one free column and
    /// row, see [`fits`].
    pub fn spawn<R: Rng>(size: (usize, usize), screen: (u16, u16), speed: f32, rng: &mut R) -> Self {
        let max_x = screen.0 as f32 - size.0 as f32;
        let max_y = screen.1 as f32 - size.1 as f32;
        let x = 1 + rng.gen_range(0..span(max_x));
        let y = 1 + rng.gen_range(0..span(max_y));
        let dx = if rng.gen_bool(0.5) { -speed } else { speed };
        let dy = if rng.gen_bool(0.5) { -speed } else { speed };
        Self::new((x as f32, y as f32), (dx, dy), (max_x, max_y))
    }

    pub fn new(position: (f32, f32), velocity: (f32, f32), max: (f32, f32)) -> Self {
        Self {
            x: position.0,
            y: position.1,
            dx: velocity.0,
            dy: velocity.1,
            max_x: max.0,
            max_y: max.1,
        }
    }

    /// Move one step, reversing direction on any wall that was reached.
    pub fn advance(&mut self) -> Bounce {
        self.x += self.dx;
        self.y += self.dy;

        let mut bounce = Bounce::default();
        if self.x < 1.0 || self.x >= self.max_x {
            self.dx = -self.dx;
            bounce.horizontal = true;
        }
        if self.y < 1.0 || self.y >= self.max_y {
            self.dy = -self.dy;
            bounce.vertical = true;
        }
        bounce
    }

    /// Screen cell of the top-left corner.
    pub fn position(&self) -> (u16, u16) {
        (self.x.max(0.0) as u16, self.y.max(0.0) as u16)
    }

    /// Horizontal heading.
    pub fn facing(&self) -> Facing {
        if self.dx < 0.0 {
            Facing::Left
        } else {
            Facing::Right
        }
    }
}

/// Number of distinct start cells along an axis with room `max`.
fn span(max: f32) -> u32 {
    (max as i64 - 1).max(1) as u32
}

/// Whether an object of `size` can move around on `screen`.
pub fn fits(size: (usize, usize), screen: (u16, u16)) -> bool {
    (screen.0 as usize) > size.0 + 1 && (screen.1 as usize) > size.1 + 1
}
