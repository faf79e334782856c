//! Single-threaded actor runtime.
//!
//! An [`Actor`] owns one [`Handler`] value and one dedicated thread. Callers
//! enqueue a request on a bounded mailbox and block on a one-shot reply
//! channel until the thread has run the request to completion. Requests are
//! handled strictly in enqueue order, one at a time, so the handler's state
//! needs no lock of its own.
//!
//! Lifecycle: `new` (idle, handler parked) → `start` (thread running) →
//! `stop` (thread joined, handler parked again). `start` and `stop` are
//! idempotent. While stopped, [`Actor::with_idle`] gives direct access to the
//! parked handler.

use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

use crate::ActorError;

/// Behavior run on the actor thread.
pub trait Handler: Send + 'static {
    /// Tagged request type
    type Request: Send + 'static;
    /// Tagged response type
    type Response: Send + 'static;

    /// Handle one request. Called only from the actor thread, or through
    /// [`Actor::with_idle`] while the thread is stopped.
    fn handle(&mut self, request: Self::Request) -> Self::Response;
}

enum Message<H: Handler> {
    Call {
        request: H::Request,
        reply: Sender<H::Response>,
    },
    Stop,
}

enum Slot<H: Handler> {
    Idle(H),
    Running {
        sender: Sender<Message<H>>,
        thread: JoinHandle<H>,
    },
    /// Handler lost (thread spawn failed or the loop itself panicked)
    Lost,
}

/// A handler bound to its own thread and mailbox.
pub struct Actor<H: Handler> {
    name: String,
    capacity: usize,
    slot: Mutex<Slot<H>>,
}

impl<H: Handler> Actor<H> {
    /// Create a stopped actor. `capacity` bounds the mailbox; senders block
    /// when it is full.
    pub fn new(name: impl Into<String>, capacity: usize, handler: H) -> Self {
        Actor {
            name: name.into(),
            capacity: capacity.max(1),
            slot: Mutex::new(Slot::Idle(handler)),
        }
    }

    /// Actor name, also used as the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the thread is running.
    pub fn is_running(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Running { .. })
    }

    /// Spawn the actor thread. Starting a running actor is a no-op.
    pub fn start(&self) -> Result<(), ActorError> {
        let mut slot = self.slot.lock();
        let handler = match std::mem::replace(&mut *slot, Slot::Lost) {
            Slot::Idle(handler) => handler,
            running @ Slot::Running { .. } => {
                *slot = running;
                warn!(target: "vecshard::actor", actor = %self.name, "actor already running, double start");
                return Ok(());
            }
            Slot::Lost => {
                return Err(ActorError::Lost {
                    name: self.name.clone(),
                })
            }
        };

        let (sender, receiver) = bounded::<Message<H>>(self.capacity);
        let name = self.name.clone();
        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_loop(&name, handler, receiver));

        match spawned {
            Ok(thread) => {
                *slot = Slot::Running { sender, thread };
                debug!(target: "vecshard::actor", actor = %self.name, "actor started");
                Ok(())
            }
            Err(e) => Err(ActorError::Spawn {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Stop the actor thread and park its handler.
    ///
    /// Requests already queued are still handled; requests sent after this
    /// call fail with `ActorError::Stopped`. Stopping a stopped actor is a
    /// no-op.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        let (sender, thread) = match std::mem::replace(&mut *slot, Slot::Lost) {
            Slot::Running { sender, thread } => (sender, thread),
            other => {
                *slot = other;
                warn!(target: "vecshard::actor", actor = %self.name, "actor already stopped, double stop");
                return;
            }
        };

        // A failed send means the loop is already gone; join either way.
        let _ = sender.send(Message::Stop);
        drop(sender);

        match thread.join() {
            Ok(handler) => {
                *slot = Slot::Idle(handler);
                debug!(target: "vecshard::actor", actor = %self.name, "actor stopped");
            }
            Err(_) => {
                error!(target: "vecshard::actor", actor = %self.name, "actor loop panicked, handler lost");
            }
        }
    }

    /// Send a request and block until the actor thread answers it.
    ///
    /// There is no timeout: a handler that blocks stalls every later request.
    pub fn call(&self, request: H::Request) -> Result<H::Response, ActorError> {
        let sender = match &*self.slot.lock() {
            Slot::Running { sender, .. } => sender.clone(),
            _ => {
                return Err(ActorError::Stopped {
                    name: self.name.clone(),
                })
            }
        };

        let (reply, response) = bounded(1);
        sender
            .send(Message::Call { request, reply })
            .map_err(|_| ActorError::Stopped {
                name: self.name.clone(),
            })?;

        // The reply sender is dropped without a value if the handler panics
        // or the loop exits first.
        response.recv().map_err(|_| ActorError::Stopped {
            name: self.name.clone(),
        })
    }

    /// Run `f` against the parked handler while the actor is stopped.
    ///
    /// Fails with `Running` if the thread is live (use [`call`](Self::call)).
    pub fn with_idle<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R, ActorError> {
        match &mut *self.slot.lock() {
            Slot::Idle(handler) => Ok(f(handler)),
            Slot::Running { .. } => Err(ActorError::Running {
                name: self.name.clone(),
            }),
            Slot::Lost => Err(ActorError::Lost {
                name: self.name.clone(),
            }),
        }
    }
}

impl<H: Handler> Drop for Actor<H> {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn run_loop<H: Handler>(
    name: &str,
    mut handler: H,
    receiver: crossbeam::channel::Receiver<Message<H>>,
) -> H {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Call { request, reply } => {
                // catch_unwind keeps one bad request from killing the actor;
                // the caller sees its reply channel close.
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler.handle(request)
                }));
                match outcome {
                    Ok(response) => {
                        let _ = reply.send(response);
                    }
                    Err(e) => {
                        error!(
                            target: "vecshard::actor",
                            actor = %name,
                            "actor request panicked: {:?}",
                            e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
                        );
                    }
                }
            }
            Message::Stop => break,
        }
    }
    handler
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Counter {
        value: u64,
    }

    enum CounterOp {
        Add(u64),
        Get,
        Panic,
    }

    impl Handler for Counter {
        type Request = CounterOp;
        type Response = u64;

        fn handle(&mut self, request: CounterOp) -> u64 {
            match request {
                CounterOp::Add(n) => {
                    // Non-atomic read-modify-write: only safe if serialized
                    let current = self.value;
                    std::thread::yield_now();
                    self.value = current + n;
                    self.value
                }
                CounterOp::Get => self.value,
                CounterOp::Panic => panic!("intentional test panic"),
            }
        }
    }

    fn counter_actor() -> Actor<Counter> {
        Actor::new("test-counter", 16, Counter { value: 0 })
    }

    #[test]
    fn test_call_before_start_is_rejected() {
        let actor = counter_actor();
        assert!(matches!(
            actor.call(CounterOp::Get),
            Err(ActorError::Stopped { .. })
        ));
    }

    #[test]
    fn test_call_roundtrip() {
        let actor = counter_actor();
        actor.start().unwrap();
        assert_eq!(actor.call(CounterOp::Add(5)).unwrap(), 5);
        assert_eq!(actor.call(CounterOp::Get).unwrap(), 5);
        actor.stop();
    }

    #[test]
    fn test_concurrent_calls_are_serialized() {
        let actor = Arc::new(counter_actor());
        actor.start().unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let a = Arc::clone(&actor);
            handles.push(std::thread::spawn(move || {
                for _ in 0..125 {
                    a.call(CounterOp::Add(1)).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(actor.call(CounterOp::Get).unwrap(), 1000);
        actor.stop();
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let actor = counter_actor();
        actor.start().unwrap();
        actor.start().unwrap();
        assert!(actor.is_running());
        actor.stop();
        actor.stop();
        assert!(!actor.is_running());
    }

    #[test]
    fn test_state_survives_restart() {
        let actor = counter_actor();
        actor.start().unwrap();
        actor.call(CounterOp::Add(3)).unwrap();
        actor.stop();

        assert_eq!(actor.with_idle(|h| h.value).unwrap(), 3);

        actor.start().unwrap();
        assert_eq!(actor.call(CounterOp::Add(1)).unwrap(), 4);
        assert!(matches!(
            actor.with_idle(|h| h.value),
            Err(ActorError::Running { .. })
        ));
        actor.stop();
    }

    #[test]
    fn test_call_after_stop_is_rejected() {
        let actor = counter_actor();
        actor.start().unwrap();
        actor.stop();
        assert!(matches!(
            actor.call(CounterOp::Add(1)),
            Err(ActorError::Stopped { .. })
        ));
    }

    #[test]
    fn test_panicking_request_does_not_kill_actor() {
        let actor = counter_actor();
        actor.start().unwrap();
        assert!(actor.call(CounterOp::Panic).is_err());
        assert_eq!(actor.call(CounterOp::Add(2)).unwrap(), 2);
        actor.stop();
    }
}
