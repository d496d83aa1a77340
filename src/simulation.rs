use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::SimulationConfig,
    error::SystemError,
    integrator::{Integrator, Parallel, Sequential},
    math::Float,
    system::BodySystem,
    utils::{self, RandomizationSettings},
};

/// Which integrator drives the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sequential,
    #[default]
    Parallel,
    /// Run a copy sequentially next to the parallel run and report how far
    /// the two drift apart.
    Compare,
}

/// Timings and drift of a [`RunMode::Compare`] run.
#[derive(Clone, Copy, Debug)]
pub struct Comparison {
    pub sequential_elapsed: Duration,
    pub parallel_elapsed: Duration,
    /// Largest distance between matching bodies' positions.
    pub max_position_deviation: Float,
    /// Largest distance between matching bodies' velocities.
    pub max_velocity_deviation: Float,
}

#[derive(Clone, Copy, Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub steps: usize,
    /// Simulated time covered by the run (`steps * dt`).
    pub simulated_time: Float,
    /// Wall clock time of the run (of the parallel run in compare mode).
    pub elapsed: Duration,
    pub comparison: Option<Comparison>,
}

/// Drives a [`BodySystem`] with a fixed time step.
#[derive(Debug)]
pub struct Simulation {
    /// Time step per frame.
    pub dt: Float,
    /// Duration covered by [`Simulation::run`].
    pub end_time: Float,
    /// Number of steps taken since creation or the last reset.
    pub frame: usize,
    pub system: BodySystem,
    pub mode: RunMode,
    /// Ranges used by [`Simulation::reset`].
    pub settings: RandomizationSettings,
    sequential: Sequential,
    parallel: Parallel,
}

impl Simulation {
    /// Builds a simulation over a random system described by `config`.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SystemError> {
        let mut rng = utils::rng_from_seed(config.seed);
        let system = utils::random_system(&mut rng, config.body_count, &config.randomization)?;
        Self::with_system(system, config)
    }

    /// Wraps an existing system, taking integrator settings from `config`.
    pub fn with_system(system: BodySystem, config: &SimulationConfig) -> Result<Self, SystemError> {
        if !(config.dt > 0.0 && config.dt.is_finite()) {
            return Err(SystemError::InvalidTimeStep(config.dt));
        }
        let parallel = match config.threads {
            Some(threads) => Parallel::with_threads(threads)?,
            None => Parallel::new(),
        };

        Ok(Self {
            dt: config.dt,
            end_time: config.end_time,
            frame: 0,
            system,
            mode: config.mode,
            settings: config.randomization,
            sequential: Sequential::new(config.position_rule, config.force_mode),
            parallel: parallel
                .with_rule(config.position_rule)
                .with_threshold_factor(config.parallel_threshold_factor),
        })
    }

    /// Replaces the system with `n` fresh random bodies.
    pub fn reset(&mut self, n: usize, rng: &mut fastrand::Rng) -> Result<(), SystemError> {
        self.system = utils::random_system(rng, n, &self.settings)?;
        self.frame = 0;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: RunMode) {
        self.mode = mode;
    }

    /// Advances the simulation by one step. Compare mode steps in parallel.
    pub fn step(&mut self) -> Result<(), SystemError> {
        let integrator = match self.mode {
            RunMode::Sequential => &self.sequential as &dyn Integrator,
            RunMode::Parallel | RunMode::Compare => &self.parallel,
        };
        self.system.run_with(integrator, self.dt)?;
        self.frame += 1;
        Ok(())
    }

    /// Number of whole steps that fit in `duration`; a partial last step is
    /// dropped.
    pub fn steps_for(&self, duration: Float) -> usize {
        if !(duration > 0.0) {
            return 0;
        }
        (duration / self.dt).floor() as usize
    }

    /// Runs `floor(duration / dt)` steps in the current mode.
    pub fn run_until(&mut self, duration: Float) -> Result<RunReport, SystemError> {
        let steps = self.steps_for(duration);
        let report = match self.mode {
            RunMode::Compare => self.run_compare(steps)?,
            mode => {
                let start = Instant::now();
                for _ in 0..steps {
                    self.step()?;
                }
                RunReport {
                    mode,
                    steps,
                    simulated_time: steps as Float * self.dt,
                    elapsed: start.elapsed(),
                    comparison: None,
                }
            }
        };
        info!(
            mode = ?report.mode,
            steps = report.steps,
            bodies = self.system.len(),
            elapsed_ms = report.elapsed.as_secs_f64() * 1e3,
            "simulation run finished"
        );
        Ok(report)
    }

    /// Runs for the configured `end_time`.
    pub fn run(&mut self) -> Result<RunReport, SystemError> {
        self.run_until(self.end_time)
    }

    fn run_compare(&mut self, steps: usize) -> Result<RunReport, SystemError> {
        let mut reference = self.system.try_clone()?;

        let start = Instant::now();
        for _ in 0..steps {
            reference.run_with(&self.sequential, self.dt)?;
        }
        let sequential_elapsed = start.elapsed();

        let start = Instant::now();
        for _ in 0..steps {
            self.step()?;
        }
        let parallel_elapsed = start.elapsed();

        let (max_position_deviation, max_velocity_deviation) = self
            .system
            .bodies()
            .iter()
            .zip(reference.bodies())
            .fold((0.0 as Float, 0.0 as Float), |(pos, vel), (a, b)| {
                (pos.max((a.pos - b.pos).mag()), vel.max((a.vel - b.vel).mag()))
            });

        Ok(RunReport {
            mode: RunMode::Compare,
            steps,
            simulated_time: steps as Float * self.dt,
            elapsed: parallel_elapsed,
            comparison: Some(Comparison {
                sequential_elapsed,
                parallel_elapsed,
                max_position_deviation,
                max_velocity_deviation,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: RunMode, dt: Float) -> SimulationConfig {
        SimulationConfig {
            dt,
            mode,
            seed: Some(17),
            body_count: 30,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn partial_last_step_is_dropped() {
        let mut sim = Simulation::from_config(&config(RunMode::Sequential, 0.3)).unwrap();
        assert_eq!(sim.steps_for(1.0), 3);
        let report = sim.run_until(1.0).unwrap();
        assert_eq!(report.steps, 3);
        assert_eq!(sim.frame, 3);
        assert!((sim.system.time() - 0.9).abs() <= 16.0 * Float::EPSILON);
    }

    #[test]
    fn run_covers_the_configured_end_time() {
        let mut cfg = config(RunMode::Sequential, 0.25);
        cfg.end_time = 1.1;
        let mut sim = Simulation::from_config(&cfg).unwrap();
        assert_eq!(sim.end_time, 1.1);
        let report = sim.run().unwrap();
        assert_eq!(report.steps, 4);
        assert_eq!(sim.frame, 4);
        assert_eq!(sim.system.time(), 1.0);
    }

    #[test]
    fn non_positive_duration_runs_nothing() {
        let mut sim = Simulation::from_config(&config(RunMode::Parallel, 0.1)).unwrap();
        assert_eq!(sim.run_until(0.0).unwrap().steps, 0);
        assert_eq!(sim.run_until(-2.0).unwrap().steps, 0);
        assert_eq!(sim.system.time(), 0.0);
    }

    #[test]
    fn invalid_dt_is_rejected() {
        let system = BodySystem::new().unwrap();
        let err = Simulation::with_system(system, &config(RunMode::Sequential, 0.0)).unwrap_err();
        assert!(matches!(err, SystemError::InvalidTimeStep(_)));
    }

    #[test]
    fn compare_mode_reports_small_drift() {
        let mut cfg = config(RunMode::Compare, 0.01);
        cfg.threads = Some(2);
        cfg.parallel_threshold_factor = 0;
        let mut sim = Simulation::from_config(&cfg).unwrap();
        let report = sim.run_until(0.05).unwrap();
        assert_eq!(report.steps, 5);
        let comparison = report.comparison.unwrap();
        let tol = Float::EPSILON * 1e4;
        let extent = sim.system.bodies().iter().map(|b| b.pos.mag()).fold(1.0, Float::max);
        let speed = sim.system.bodies().iter().map(|b| b.vel.mag()).fold(1.0, Float::max);
        assert!(comparison.max_position_deviation <= tol * extent);
        assert!(comparison.max_velocity_deviation <= tol * speed);
    }

    #[test]
    fn reset_regenerates_bodies() {
        let mut sim = Simulation::from_config(&config(RunMode::Sequential, 0.1)).unwrap();
        sim.step().unwrap();
        sim.reset(4, &mut fastrand::Rng::with_seed(2)).unwrap();
        assert_eq!(sim.system.len(), 4);
        assert_eq!(sim.frame, 0);
        assert_eq!(sim.system.time(), 0.0);
    }
}
