//! One fixed-size explicit step of the all-pairs gravity simulation.
//!
//! Every step runs the same phases over the body slice:
//! 1. reset the force accumulators,
//! 2. accumulate pairwise Newtonian forces `G * m_i * m_j * d / |d|^3`,
//! 3. resolve collisions against every overlapping partner at once,
//! 4. kick the velocity with the accumulated force,
//! 5. move the position (trapezoidal or semi-implicit rule),
//! 6. commit the new velocity.
//!
//! Collision response always reads the pre-step velocities and masses of all
//! partners, so the result does not depend on body order. A phase finishes
//! for every body before the next one starts.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::Body;
use crate::error::SystemError;
use crate::math::{Float, Vector2, GRAVITY_CONST};

/// Advances a slice of bodies by one time step.
pub trait Integrator {
    fn step(&self, bodies: &mut [Body], dt: Float);
}

/// How positions are advanced once the new velocity is known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionRule {
    /// `x += dt * v' + (v'' - v') * dt / 2`, the mean of the post-collision
    /// and final velocities.
    #[default]
    Trapezoidal,
    /// `x += dt * v''`.
    SemiImplicit,
}

impl PositionRule {
    #[inline]
    fn is_trapezoidal(self) -> bool {
        self == PositionRule::Trapezoidal
    }
}

/// How the sequential integrator visits body pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceMode {
    /// Each unordered pair once, applying Newton's third law.
    #[default]
    Pairwise,
    /// Every ordered pair, each direction computed on its own.
    AllPairs,
}

/// Collision partners gathered for one body during a step.
#[derive(Clone, Copy, Debug, Default)]
struct Contact {
    hit: bool,
    mass: Float,
    momentum: Vector2,
}

impl Contact {
    #[inline]
    fn add(&mut self, partner: &Body) {
        self.hit = true;
        self.mass += partner.mass;
        self.momentum += partner.momentum();
    }

    /// Velocity of `body` after colliding with every gathered partner, treated
    /// as one elastic collision with a body of the summed mass and momentum.
    #[inline]
    fn resolve(&self, body: &Body) -> Vector2 {
        if !self.hit {
            return body.vel;
        }
        let total = body.mass + self.mass;
        body.vel * ((body.mass - self.mass) / total) + self.momentum * (2.0 / total)
    }
}

/// Force and collision data for one body, computed from a read-only view.
#[derive(Clone, Copy, Debug, Default)]
struct Kick {
    force: Vector2,
    contact: Contact,
}

/// Gravitational force on `a` from `b`, and whether the two overlap.
///
/// Coincident bodies exert no force on each other; they always overlap, so
/// collision response handles them.
#[inline(always)]
fn interact(a: &Body, b: &Body) -> (Vector2, bool) {
    let d = b.pos - a.pos;
    let r = d.mag();
    let hit = r <= a.radius + b.radius;
    if r == 0.0 {
        return (Vector2::zero(), hit);
    }
    let scalar = GRAVITY_CONST * a.mass * b.mass / (r * r * r);
    (d * scalar, hit)
}

/// Full force and contact set of body `i` against every other body.
#[inline]
fn gather(bodies: &[Body], i: usize) -> Kick {
    let a = &bodies[i];
    let mut kick = Kick::default();
    for (j, b) in bodies.iter().enumerate() {
        if j == i {
            continue;
        }
        let (force, hit) = interact(a, b);
        kick.force += force;
        if hit {
            kick.contact.add(b);
        }
    }
    kick
}

#[inline]
fn apply(body: &mut Body, kick: &Kick, dt: Float, trapezoidal: bool) {
    body.force = kick.force;
    let vel = kick.contact.resolve(body);
    body.advance(vel, dt, trapezoidal);
}

/// Single-threaded O(n²) integrator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential {
    pub rule: PositionRule,
    pub forces: ForceMode,
}

impl Sequential {
    pub fn new(rule: PositionRule, forces: ForceMode) -> Self {
        Self { rule, forces }
    }

    fn step_pairwise(&self, bodies: &mut [Body], dt: Float) {
        let n = bodies.len();
        for body in bodies.iter_mut() {
            body.force = Vector2::zero();
        }

        let mut contacts = vec![Contact::default(); n];
        for i in 0..n {
            let (head, tail) = bodies.split_at_mut(i + 1);
            let a = &mut head[i];
            for (k, b) in tail.iter_mut().enumerate() {
                let (force, hit) = interact(a, b);
                a.force += force;
                b.force -= force;
                if hit {
                    // Velocities are untouched until the update pass below.
                    contacts[i].add(b);
                    contacts[i + 1 + k].add(a);
                }
            }
        }

        let trapezoidal = self.rule.is_trapezoidal();
        for (body, contact) in bodies.iter_mut().zip(&contacts) {
            let vel = contact.resolve(body);
            body.advance(vel, dt, trapezoidal);
        }
    }

    fn step_all_pairs(&self, bodies: &mut [Body], dt: Float) {
        let kicks: Vec<Kick> = (0..bodies.len()).map(|i| gather(bodies, i)).collect();
        let trapezoidal = self.rule.is_trapezoidal();
        for (body, kick) in bodies.iter_mut().zip(&kicks) {
            apply(body, kick, dt, trapezoidal);
        }
    }
}

impl Integrator for Sequential {
    fn step(&self, bodies: &mut [Body], dt: Float) {
        if bodies.is_empty() {
            return;
        }
        match self.forces {
            ForceMode::Pairwise => self.step_pairwise(bodies, dt),
            ForceMode::AllPairs => self.step_all_pairs(bodies, dt),
        }
    }
}

/// Data-parallel integrator built on rayon.
///
/// Bodies are split into one contiguous chunk per worker. The first pass
/// computes each body's force and collision partners against the whole
/// (read-only) slice; the second pass lets every worker update only the
/// bodies of its own chunk. Forces are computed in both directions, so no
/// two workers ever write the same accumulator.
///
/// Systems with at most `threads * threshold_factor` bodies are stepped
/// sequentially.
#[derive(Debug)]
pub struct Parallel {
    pub rule: PositionRule,
    pub threshold_factor: usize,
    /// Dedicated pool; the global rayon pool is used when absent.
    pool: Option<rayon::ThreadPool>,
}

impl Default for Parallel {
    fn default() -> Self {
        Self::new()
    }
}

impl Parallel {
    pub const DEFAULT_THRESHOLD_FACTOR: usize = 10;

    pub fn new() -> Self {
        Self {
            rule: PositionRule::default(),
            threshold_factor: Self::DEFAULT_THRESHOLD_FACTOR,
            pool: None,
        }
    }

    /// Runs on a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, SystemError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self {
            pool: Some(pool),
            ..Self::new()
        })
    }

    pub fn with_rule(mut self, rule: PositionRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_threshold_factor(mut self, factor: usize) -> Self {
        self.threshold_factor = factor;
        self
    }

    /// Number of workers a step is split across.
    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |pool| pool.current_num_threads())
    }

    /// Whether a system of `n` bodies is large enough to be worth splitting.
    pub fn is_worth_splitting(&self, n: usize) -> bool {
        n > self.threads().saturating_mul(self.threshold_factor)
    }

    fn step_chunked(&self, bodies: &mut [Body], dt: Float, threads: usize) {
        let n = bodies.len();
        let chunk = n.div_ceil(threads.max(1));
        let trapezoidal = self.rule.is_trapezoidal();

        let mut kicks = vec![Kick::default(); n];
        {
            let shared: &[Body] = bodies;
            kicks
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(c, out)| {
                    let start = c * chunk;
                    for (k, kick) in out.iter_mut().enumerate() {
                        *kick = gather(shared, start + k);
                    }
                });
        }

        bodies
            .par_chunks_mut(chunk)
            .zip(kicks.par_chunks(chunk))
            .for_each(|(own, kicks)| {
                for (body, kick) in own.iter_mut().zip(kicks) {
                    apply(body, kick, dt, trapezoidal);
                }
            });
    }
}

impl Integrator for Parallel {
    fn step(&self, bodies: &mut [Body], dt: Float) {
        if bodies.is_empty() {
            return;
        }
        let threads = self.threads();
        if !self.is_worth_splitting(bodies.len()) {
            trace!(bodies = bodies.len(), threads, "system too small to split, stepping sequentially");
            Sequential::new(self.rule, ForceMode::Pairwise).step(bodies, dt);
            return;
        }
        match &self.pool {
            Some(pool) => pool.install(|| self.step_chunked(bodies, dt, threads)),
            None => self.step_chunked(bodies, dt, threads),
        }
    }
}
