// PHYSICAL
/// Gravitational constant in N-body units
pub const G: f64 = 1.0;
/// Softening length squared (e^2), keeps coincident particles finite.
pub const SOFTENING2: f64 = 1e-8;

// INTEGRATION
/// Accuracy parameter for the start-up steps.
pub const ETA_S: f64 = 0.01;
/// Accuracy parameter of the Aarseth step criterion (Makino & Aarseth 1992, eq. 7).
pub const ETA_N: f64 = 0.01;
/// Smallest block step, 2^-23.
pub const D_TIME_MIN: f64 = 1.1920928955078125e-07;
/// Largest block step, 2^-3.
pub const D_TIME_MAX: f64 = 0.125;
/// Default stopping time in N-body units.
pub const ITIME: f64 = 1.0;
/// Default cap on block ticks.
pub const ITERATIONS: u64 = 1_000_000;

// COMPUTE
/// i-particles per work group, also the j-tile width.
pub const BLOCK_SIZE: usize = 32;
/// Number of j-partitions reduced per force evaluation.
pub const J_PARTITIONS: usize = 16;
/// Hard cap on number of threads to use.
pub const MAX_THREADS: usize = 20;
/// Minimum number of particles per thread.
pub const OBJECTS_PER_THREAD: usize = 256;

// DIAGNOSTICS
/// Ticks between energy samples.
pub const ENERGY_INTERVAL: u64 = 64;
/// Neighbours used for the local density estimate (Casertano & Hut 1985).
pub const DENSITY_NEIGHBOURS: usize = 10;
/// Mass fraction enclosed by the core radius.
pub const CORE_MASS_FRACTION: f64 = 0.2;
/// Interval in ticks between snapshot exchange checks
pub const CHECK_INTERVAL: u64 = 16;
