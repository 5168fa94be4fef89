use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, factor: f32) -> Vec2 {
        Vec2 {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

/// Axis-aligned rectangle; `x`/`y` is the top-left corner in world pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn contains(&self, point: Vec2, tolerance: f32) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.x + self.width + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.y + self.height + tolerance
    }

    /// Rectangle of the given size whose bottom-center sits on `foot`.
    pub fn anchored_at_foot(foot: Vec2, width: f32, height: f32) -> Rect {
        Rect {
            x: foot.x - width * 0.5,
            y: foot.y - height,
            width,
            height,
        }
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

pub fn ease_in_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Moves `current` toward `target` by `fraction` of the remaining gap.
pub fn approach(current: f32, target: f32, fraction: f32) -> f32 {
    current + (target - current) * fraction.clamp(0.0, 1.0)
}

/// Converts a per-reference-tick smoothing fraction into the fraction for a
/// tick of `dt_ms`, so the curve matches the reference rate at any framerate.
pub fn frame_scaled_fraction(fraction_per_tick: f32, dt_ms: f64, reference_tick_ms: f64) -> f32 {
    if dt_ms <= 0.0 || reference_tick_ms <= 0.0 {
        return 0.0;
    }
    let keep = (1.0 - fraction_per_tick.clamp(0.0, 1.0)) as f64;
    (1.0 - keep.powf(dt_ms / reference_tick_ms)) as f32
}
