use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::error::SystemError;
use crate::math::{Float, Vector2};
use crate::system::BodySystem;

/// Half-open interval `[min, max)` a random value is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Float,
    pub max: Float,
}

impl Range {
    pub const fn new(min: Float, max: Float) -> Self {
        Self { min, max }
    }

    fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

/// Ranges used when generating random bodies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizationSettings {
    /// Range of both position components.
    pub position: Range,
    /// Range of both velocity components.
    pub velocity: Range,
    pub mass: Range,
    pub radius: Range,
}

impl Default for RandomizationSettings {
    fn default() -> Self {
        Self {
            position: Range::new(-100.0, 100.0),
            velocity: Range::new(-10.0, 10.0),
            mass: Range::new(1.0e5, 1.0e6),
            radius: Range::new(0.1, 100.0),
        }
    }
}

impl RandomizationSettings {
    /// Checks that every range is ordered and that generated masses and radii
    /// will be positive.
    pub fn validate(&self) -> Result<(), SystemError> {
        if !(self.position.is_ordered()
            && self.velocity.is_ordered()
            && self.mass.is_ordered()
            && self.radius.is_ordered())
        {
            return Err(SystemError::InvalidSettings("range minimum exceeds its maximum"));
        }
        if !(self.mass.min > 0.0) {
            return Err(SystemError::InvalidSettings("minimum mass must be positive"));
        }
        if !(self.radius.min > 0.0) {
            return Err(SystemError::InvalidSettings("minimum radius must be positive"));
        }
        Ok(())
    }
}

/// Seeded generator for reproducible runs, entropy-seeded otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> fastrand::Rng {
    match seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    }
}

#[cfg(not(feature = "single-precision"))]
#[inline]
fn unit(rng: &mut fastrand::Rng) -> Float {
    rng.f64()
}

#[cfg(feature = "single-precision")]
#[inline]
fn unit(rng: &mut fastrand::Rng) -> Float {
    rng.f32()
}

/// Uniform value in `[range.min, range.max)`; `range.min` for an empty range.
pub fn random_float(rng: &mut fastrand::Rng, range: Range) -> Float {
    let value = range.min + (range.max - range.min) * unit(rng);
    // Scaling can round up onto the excluded upper bound.
    if value < range.max { value } else { range.min }
}

/// Vector whose components are both drawn from `range`.
pub fn random_vector(rng: &mut fastrand::Rng, range: Range) -> Vector2 {
    let x = random_float(rng, range);
    let y = random_float(rng, range);
    Vector2::new(x, y)
}

/// Random body with zero force. The settings are assumed valid.
pub fn random_body(rng: &mut fastrand::Rng, name: &str, settings: &RandomizationSettings) -> Body {
    let pos = random_vector(rng, settings.position);
    let vel = random_vector(rng, settings.velocity);
    let mass = random_float(rng, settings.mass);
    let radius = random_float(rng, settings.radius);
    Body::new(name, pos, vel, mass, radius)
}

/// Builds a system of `n` random bodies named `Body 1` to `Body n`.
pub fn random_system(
    rng: &mut fastrand::Rng,
    n: usize,
    settings: &RandomizationSettings,
) -> Result<BodySystem, SystemError> {
    settings.validate()?;
    let mut system = BodySystem::new()?;
    for i in 0..n {
        system.add_body(random_body(rng, &format!("Body {}", i + 1), settings))?;
    }
    Ok(system)
}
