//! Planar coordinate system for vehicle positions and velocities.
//!
//! Vehicles live in a flat local frame measured in metres. Velocities are
//! metres per tick, so dead reckoning is a plain `position + velocity * dt`.
//!
//! Headings are degrees in `[0, 360)`, measured counter-clockwise from the
//! +x axis. Angular differences always take the short way round the circle,
//! giving a value in `[0, 180]`.

use std::ops::{Add, Mul, Neg, Sub};

/// Degrees in a full turn.
pub const FULL_TURN: f64 = 360.0;

/// A point in the local planar frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// East-west axis (metres)
    pub x: f64,
    /// North-south axis (metres)
    pub y: f64,
}

impl Position {
    /// Origin of the local frame.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance. Cheaper than [`Position::distance`] for
    /// range comparisons.
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance between two positions.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Dead-reckoned position after moving at `velocity` for `dt` ticks.
    pub fn advance(&self, velocity: Velocity, dt: f64) -> Self {
        Self {
            x: self.x + velocity.vx * dt,
            y: self.y + velocity.vy * dt,
        }
    }

    /// True when both components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Position {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Position {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Neg for Position {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// A velocity vector in metres per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    /// A stationary vehicle.
    pub const ZERO: Self = Self { vx: 0.0, vy: 0.0 };

    /// Create a new velocity from its components.
    pub const fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    /// Create a velocity from a speed and a heading in degrees.
    pub fn from_heading(speed: f64, heading_deg: f64) -> Self {
        let rad = heading_deg.to_radians();
        Self {
            vx: speed * rad.cos(),
            vy: speed * rad.sin(),
        }
    }

    /// Magnitude of the vector.
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    /// Heading in degrees, normalised to `[0, 360)`.
    ///
    /// A stationary vehicle reports heading 0.
    pub fn heading(&self) -> f64 {
        if self.vx == 0.0 && self.vy == 0.0 {
            return 0.0;
        }
        normalize_heading(self.vy.atan2(self.vx).to_degrees())
    }

    /// True when both components are finite.
    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite()
    }
}

impl Add for Velocity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            vx: self.vx + other.vx,
            vy: self.vy + other.vy,
        }
    }
}

impl Sub for Velocity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            vx: self.vx - other.vx,
            vy: self.vy - other.vy,
        }
    }
}

impl Mul<f64> for Velocity {
    type Output = Self;

    #[inline]
    fn mul(self, k: f64) -> Self {
        Self {
            vx: self.vx * k,
            vy: self.vy * k,
        }
    }
}

/// Normalise any angle in degrees to `[0, 360)`.
pub fn normalize_heading(deg: f64) -> f64 {
    let h = deg.rem_euclid(FULL_TURN);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if h >= FULL_TURN {
        0.0
    } else {
        h
    }
}

/// Smallest angle between two headings, in `[0, 180]`.
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (normalize_heading(a) - normalize_heading(b)).abs();
    if diff > FULL_TURN / 2.0 {
        FULL_TURN - diff
    } else {
        diff
    }
}
