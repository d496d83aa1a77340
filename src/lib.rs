pub mod body;
pub mod c_api;
pub mod config;
pub mod error;
pub mod integrator;
pub mod math;
pub mod simulation;
pub mod system;
pub mod utils;

pub use body::{Body, MAX_NAME_LEN};
pub use config::SimulationConfig;
pub use error::{ConfigError, SystemError};
pub use integrator::{ForceMode, Integrator, Parallel, PositionRule, Sequential};
pub use math::{Float, Vector2, VectorExt, GRAVITY_CONST};
pub use simulation::{Comparison, RunMode, RunReport, Simulation};
pub use system::BodySystem;
pub use utils::{RandomizationSettings, Range};
