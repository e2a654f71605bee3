//! Lock-expiry sweeper: a background polling loop that expires overdue
//! fund locks and returns their capacity to the pools.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::TreasuryEngine;
use crate::store::TreasuryStore;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to look for expired locks.
    pub poll_interval: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            name: "lock-sweeper".to_string(),
        }
    }
}

/// Handle to control and join the sweeper thread.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the sweeper to stop.
    /// An in-flight sweep cycle runs to completion first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background lock-expiry sweeper.
///
/// Single cooperative loop: the stop signal is checked between cycles
/// and cycles never overlap. One cycle's failure is logged and never
/// terminates the loop.
#[derive(Debug)]
pub struct LockSweeper;

impl LockSweeper {
    pub fn spawn<S>(engine: Arc<TreasuryEngine<S>>, config: SweeperConfig) -> SweeperHandle
    where
        S: TreasuryStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || sweeper_loop(engine, config, shutdown_rx))
            .expect("failed to spawn lock sweeper thread");

        SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn sweeper_loop<S>(
    engine: Arc<TreasuryEngine<S>>,
    config: SweeperConfig,
    shutdown_rx: mpsc::Receiver<()>,
) where
    S: TreasuryStore,
{
    info!(sweeper = %config.name, "lock sweeper started");

    loop {
        // Shutdown check (non-blocking), before the next cycle begins.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match engine.sweep_expired_locks() {
            Ok(swept) if !swept.is_empty() => {
                info!(sweeper = %config.name, count = swept.len(), "swept expired locks");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(sweeper = %config.name, error = %err, "sweep cycle failed");
            }
        }

        thread::sleep(config.poll_interval);
    }

    info!(sweeper = %config.name, "lock sweeper stopped");
}
