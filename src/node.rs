//! Node - paces a process's control loop and reports shutdown
//!
//! ```no_run
//! use std::time::Duration;
//! use venom_pubsub::{Node, NodeEvent};
//!
//! let node = Node::new();
//! while let Ok(NodeEvent::Tick) = node.wait(Duration::from_secs(1)) {
//!     // one iteration of work
//! }
//! ```

use crate::error::NodeWaitError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep inside `wait`
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Set by SIGINT/SIGTERM, shared by every node of the process
static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);
static SIGNAL_HANDLER: OnceLock<()> = OnceLock::new();

fn install_signal_handler() {
    SIGNAL_HANDLER.get_or_init(|| {
        if let Err(e) = ctrlc::set_handler(|| {
            TERMINATION_REQUESTED.store(true, Ordering::Release);
        }) {
            log::warn!("termination signals will not stop nodes: {}", e);
        }
    });
}

/// Outcome of a completed [`Node::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// Cycle elapsed, run the next iteration
    Tick,
    /// A [`ShutdownHandle`] asked the loop to finish
    StopRequested,
}

/// Requests a cooperative stop from any thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Process-local loop pacer
#[derive(Debug)]
pub struct Node {
    stop: Arc<AtomicBool>,
}

impl Node {
    /// Create a node; the first node of a process installs the SIGINT/SIGTERM handler
    pub fn new() -> Self {
        install_signal_handler();
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Block for `cycle_time` unless a stop or a signal arrives first
    pub fn wait(&self, cycle_time: Duration) -> Result<NodeEvent, NodeWaitError> {
        let deadline = Instant::now() + cycle_time;
        loop {
            if TERMINATION_REQUESTED.load(Ordering::Acquire) {
                return Err(NodeWaitError::Interrupted);
            }
            if self.stop.load(Ordering::Acquire) {
                return Ok(NodeEvent::StopRequested);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(NodeEvent::Tick);
            }
            std::thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_ticks_after_cycle() {
        let node = Node::new();
        let start = Instant::now();
        assert_eq!(node.wait(Duration::from_millis(20)), Ok(NodeEvent::Tick));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(node.wait(Duration::ZERO), Ok(NodeEvent::Tick));
    }

    #[test]
    fn test_shutdown_handle_stops_wait() {
        let node = Node::new();
        let handle = node.shutdown_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.stop();
        });

        let start = Instant::now();
        assert_eq!(node.wait(Duration::from_secs(10)), Ok(NodeEvent::StopRequested));
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();

        // Stop is sticky
        assert_eq!(node.wait(Duration::from_secs(10)), Ok(NodeEvent::StopRequested));
        assert!(node.shutdown_handle().is_stopped());
    }
}
