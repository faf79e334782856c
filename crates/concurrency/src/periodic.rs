//! Stoppable periodic loop on a dedicated thread.
//!
//! The stop flag is checked at the top of every iteration and the wait
//! between iterations is a condvar timed wait, so [`PeriodicTask::stop`]
//! wakes a sleeping loop immediately and then joins it.

use parking_lot::{Condvar, Mutex};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

use crate::ActorError;

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// A closure run every `interval` until stopped or until it breaks.
pub struct PeriodicTask {
    name: String,
    signal: Arc<StopSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn the loop. `tick` runs immediately, then once per `interval`.
    /// Returning `ControlFlow::Break(())` ends the loop.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> Result<Self, ActorError>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let loop_signal = Arc::clone(&signal);
        let loop_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                loop {
                    if *loop_signal.stopped.lock() {
                        break;
                    }

                    let outcome =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(&mut tick));
                    match outcome {
                        Ok(ControlFlow::Break(())) => break,
                        Ok(ControlFlow::Continue(())) => {}
                        Err(_) => {
                            error!(target: "vecshard::periodic", task = %loop_name, "periodic tick panicked");
                        }
                    }

                    let mut stopped = loop_signal.stopped.lock();
                    if !*stopped {
                        loop_signal.wake.wait_for(&mut stopped, interval);
                    }
                    if *stopped {
                        break;
                    }
                }
                debug!(target: "vecshard::periodic", task = %loop_name, "periodic task exited");
            })
            .map_err(|e| ActorError::Spawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(PeriodicTask {
            name,
            signal,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Task name, also the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the loop has exited (stopped or broke out).
    pub fn is_finished(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Signal the loop and join it. Idempotent.
    pub fn stop(&self) {
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
            self.signal.wake.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(target: "vecshard::periodic", task = %self.name, "periodic thread panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
