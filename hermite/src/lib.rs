pub mod backend;
pub mod config;
pub mod constants;
pub mod corrector;
pub mod diagnostics;
pub mod error;
pub mod exchange;
pub mod presets;
pub mod run;
pub mod scheduler;
pub mod simulation;
pub mod store;
pub mod timestep;

pub use backend::{CpuBackend, ForceBackend, GpuBackend};
pub use config::SimulationConfig;
pub use diagnostics::{Energy, StructureReport};
pub use error::HermiteError;
pub use exchange::{Snapshot, SnapshotExchange};
pub use kernels::{Body, Forces, Predictor};
pub use run::run_sim_loop;
pub use simulation::{RunSummary, Simulation, TickReport};
pub use store::{Particle, ParticleInit, ParticleStore};
