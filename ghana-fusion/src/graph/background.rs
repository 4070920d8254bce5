//! Background pose graph optimization.
//!
//! Runs the optimizer on a worker thread so frame intake never blocks on a
//! solve.
//!
//! ```text
//! ┌────────────────────────┐   snapshot    ┌─────────────────────────┐
//! │ Fusion thread          │──────────────▶│ Worker                  │
//! │  update() per frame    │               │  GraphOptimizer on copy │
//! │  try_receive() between │◀──────────────│                         │
//! │  frames, swap poses    │    result     └─────────────────────────┘
//! └────────────────────────┘
//! ```
//!
//! At most one snapshot is in flight. Results are committed by the owner as
//! a whole set, so tracking never observes a partial update.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use log::{debug, warn};

use super::config::GraphOptimizerConfig;
use super::optimizer::{GraphError, GraphOptimizer, OptimizationResult};
use super::pose_graph::PoseGraph;

/// Outcome of one background run.
pub type OptimizationOutcome = Result<OptimizationResult, GraphError>;

/// Pose graph optimizer running on its own thread.
pub struct BackgroundOptimizer {
    /// Channel to send graph snapshots to the worker.
    job_tx: Option<Sender<PoseGraph>>,
    /// Channel to receive results from the worker.
    result_rx: Receiver<OptimizationOutcome>,
    /// Worker thread handle.
    thread_handle: Option<JoinHandle<()>>,
    /// A snapshot was submitted and its result not yet received.
    in_flight: bool,
}

impl BackgroundOptimizer {
    /// Spawn the worker thread.
    pub fn new(config: GraphOptimizerConfig) -> Self {
        let (job_tx, job_rx) = bounded::<PoseGraph>(1);
        let (result_tx, result_rx) = bounded::<OptimizationOutcome>(1);
        let optimizer = GraphOptimizer::new(config);

        let handle = thread::spawn(move || {
            // Exits when the job sender is dropped
            while let Ok(graph) = job_rx.recv() {
                debug!(
                    "Background optimization: {} nodes, {} edges",
                    graph.num_nodes(),
                    graph.num_edges()
                );
                let outcome = optimizer.optimize(&graph);
                if result_tx.send(outcome).is_err() {
                    break;
                }
            }
        });

        Self {
            job_tx: Some(job_tx),
            result_rx,
            thread_handle: Some(handle),
            in_flight: false,
        }
    }

    /// Hand a graph snapshot to the worker.
    ///
    /// Returns `false` if a job is already in flight or the worker stopped.
    pub fn submit(&mut self, graph: PoseGraph) -> bool {
        if self.in_flight {
            return false;
        }
        let Some(tx) = &self.job_tx else {
            return false;
        };
        if tx.send(graph).is_err() {
            warn!("Background optimizer worker is gone");
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Is a snapshot being optimized?
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Poll for a finished result without blocking.
    pub fn try_receive(&mut self) -> Option<OptimizationOutcome> {
        if !self.in_flight {
            return None;
        }
        match self.result_rx.try_recv() {
            Ok(outcome) => {
                self.in_flight = false;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = false;
                None
            }
        }
    }

    /// Block until the in-flight result is available.
    ///
    /// Returns `None` if nothing is in flight or the worker stopped.
    pub fn wait(&mut self) -> Option<OptimizationOutcome> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.result_rx.recv().ok()
    }

    /// Stop the worker thread, discarding any pending result.
    pub fn stop(&mut self) {
        // Dropping the sender ends the worker loop
        self.job_tx = None;
        while self.result_rx.try_recv().is_ok() {}
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Background optimizer worker panicked");
            }
        }
        self.in_flight = false;
    }

    /// Is the worker thread running?
    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl Drop for BackgroundOptimizer {
    fn drop(&mut self) {
        self.stop();
    }
}
