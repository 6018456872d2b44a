//! # Worker Pool
//!
//! A fixed-size pool of threads that execute processor compute steps in
//! parallel. Each worker has a dedicated channel of compute jobs; the
//! dispatch loop submits one job at a time and blocks on a condition
//! variable when every worker is busy (backpressure). A worker signals
//! availability exactly when it finishes a compute step.
//!
//! Workers never execute commit steps. A compute step that fails or panics
//! is logged with the originating processor identified and treated as
//! complete, so a single faulty processor never stalls the pool or the
//! frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, trace};
use parking_lot::{Condvar, Mutex};

use super::condition::Trigger;
use super::processor::ProcessorHandle;

/// Maximum number of jobs in flight per worker channel.
///
/// Set to 1 so a submitted job starts immediately on an idle worker instead
/// of queueing behind another compute step.
const MAX_JOBS_IN_FLIGHT: usize = 1;

/// One compute step assigned to a worker.
pub(crate) struct ComputeJob {
    /// The processor whose compute step runs.
    pub unit: Arc<ProcessorHandle>,
    /// The trigger the compute step observes.
    pub trigger: Trigger,
}

/// A communication channel between the dispatch loop and one worker thread.
struct WorkerChannel {
    job_sender: Sender<ComputeJob>,
    _worker: JoinHandle<()>,
}

/// In-flight counters shared between the dispatch loop and the workers.
struct PoolCounts {
    in_flight: Vec<usize>,
}

impl PoolCounts {
    fn total(&self) -> usize {
        self.in_flight.iter().sum()
    }
}

/// Guard/notify pair for worker availability and batch completion.
struct PoolState {
    counts: Mutex<PoolCounts>,
    available: Condvar,
}

/// A fixed-size pool of compute workers.
pub(crate) struct WorkerPool {
    channels: Vec<WorkerChannel>,
    state: Arc<PoolState>,
    current_channel: usize,
}

impl WorkerPool {
    /// Creates a pool with `worker_count` threads.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let state = Arc::new(PoolState {
            counts: Mutex::new(PoolCounts {
                in_flight: vec![0; worker_count],
            }),
            available: Condvar::new(),
        });

        info!("Starting compute pool with {worker_count} workers");

        let mut channels = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (job_tx, job_rx) = channel::<ComputeJob>();
            let worker_state = Arc::clone(&state);

            let worker = thread::Builder::new()
                .name(format!("compute-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        run_compute_step(&job);
                        let mut counts = worker_state.counts.lock();
                        counts.in_flight[index] -= 1;
                        drop(counts);
                        worker_state.available.notify_all();
                    }
                    trace!("Compute worker {index} exiting");
                })
                .expect("failed to spawn compute worker");

            channels.push(WorkerChannel {
                job_sender: job_tx,
                _worker: worker,
            });
        }

        Self {
            channels,
            state,
            current_channel: 0,
        }
    }

    /// Submits a compute job, blocking until a worker accepts it.
    ///
    /// Worker selection is round robin starting from the last used channel.
    /// When every worker is at capacity, the call waits on the availability
    /// signal a finishing worker raises.
    pub fn submit(&mut self, job: ComputeJob) {
        let state = Arc::clone(&self.state);
        let mut counts = state.counts.lock();
        loop {
            if let Some(index) = self.find_available_channel(&counts) {
                match self.channels[index].job_sender.send(job) {
                    Ok(()) => {
                        counts.in_flight[index] += 1;
                        self.current_channel = (index + 1) % self.channels.len();
                    }
                    Err(send_error) => {
                        // A dead worker means its thread panicked outside the
                        // compute guard; drop the job rather than stall the
                        // dispatch loop.
                        error!(
                            "Compute worker {index} is gone; dropping job for processor {}",
                            send_error.0.unit.id()
                        );
                    }
                }
                return;
            }
            self.state.available.wait(&mut counts);
        }
    }

    /// Blocks until every in-flight compute step has finished.
    pub fn wait_idle(&self) {
        let mut counts = self.state.counts.lock();
        while counts.total() > 0 {
            self.state.available.wait(&mut counts);
        }
    }

    /// Finds a channel below its in-flight cap, round robin.
    fn find_available_channel(&self, counts: &PoolCounts) -> Option<usize> {
        let worker_count = self.channels.len();
        for offset in 0..worker_count {
            let index = (self.current_channel + offset) % worker_count;
            if counts.in_flight[index] < MAX_JOBS_IN_FLIGHT {
                return Some(index);
            }
        }
        None
    }
}

/// Runs one compute step, containing failures and panics.
fn run_compute_step(job: &ComputeJob) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut processor = job.unit.processor();
        processor.compute(&job.trigger)
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(step_error)) => {
            error!(
                "Compute step of processor {} failed: {step_error}",
                job.unit.id()
            );
        }
        Err(_) => {
            error!("Compute step of processor {} panicked", job.unit.id());
        }
    }
}
