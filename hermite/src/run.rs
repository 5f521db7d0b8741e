use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use crate::{
    backend::ForceBackend,
    constants::CHECK_INTERVAL,
    error::HermiteError,
    exchange::SnapshotExchange,
    simulation::{RunSummary, Simulation},
};

/// Integrate until the run is finished or `token` is raised, publishing a
/// snapshot whenever the observer asks for one. The exchange is marked
/// finished on return, also on error.
pub fn run_sim_loop<B: ForceBackend>(
    sim: &mut Simulation<B>,
    exchange: &SnapshotExchange,
    token: &AtomicBool,
) -> Result<RunSummary, HermiteError> {
    let result = drive(sim, exchange, token);
    if result.is_ok() {
        exchange.store(sim.snapshot());
    }
    exchange.finish();
    info!("Simulation loop terminated");
    result
}

fn drive<B: ForceBackend>(
    sim: &mut Simulation<B>,
    exchange: &SnapshotExchange,
    token: &AtomicBool,
) -> Result<RunSummary, HermiteError> {
    let mut i = 0;
    while !sim.is_finished() {
        i += 1;
        sim.step()?;

        if i % CHECK_INTERVAL == 0 {
            if exchange.should_store() {
                exchange.store(sim.snapshot());
            }
            if token.load(Ordering::Relaxed) {
                info!("Stop requested at tick {}", sim.tick());
                break;
            }
        }
    }
    Ok(sim.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::CpuBackend, config::SimulationConfig, presets};

    fn sim(config: SimulationConfig) -> Simulation<CpuBackend> {
        let initial = presets::random_cluster(24, 8);
        let backend = CpuBackend::new(&config, initial.len()).unwrap();
        Simulation::new(config, &initial, backend).unwrap()
    }

    #[test]
    fn loop_runs_to_completion_and_publishes() {
        let config = SimulationConfig {
            iterations: 40,
            itime: 100.0,
            ..Default::default()
        };
        let mut s = sim(config);
        let exchange = SnapshotExchange::new();
        let summary = run_sim_loop(&mut s, &exchange, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.ticks, 40);
        assert!(exchange.is_finished());
        let last = exchange.sample().unwrap();
        assert_eq!(last.tick, 40);
        assert_eq!(last.positions.len(), 24);
    }

    #[test]
    fn token_stops_the_loop() {
        let config = SimulationConfig {
            iterations: 10_000,
            itime: 100.0,
            ..Default::default()
        };
        let mut s = sim(config);
        let exchange = SnapshotExchange::new();
        let summary = run_sim_loop(&mut s, &exchange, &AtomicBool::new(true)).unwrap();
        assert_eq!(summary.ticks, CHECK_INTERVAL);
    }
}
