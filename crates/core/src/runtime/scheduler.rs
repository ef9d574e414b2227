use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::shutdown::ShutdownGuard;
use crate::dispatch::{Accepted, Dispatcher};
use crate::io::input::{self, InputReceiver, InputSender};

/// Inbound buffer; transports block once this many messages are pending.
const INPUT_BUFFER: usize = 256;

/// Drives the dispatcher. Messages are accepted one at a time in arrival
/// order; only the slow remainder (answers, ambient) runs on spawned tasks.
pub struct Runtime {
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownGuard,
    event_rx: InputReceiver,
    tracker: TaskTracker,
    shutdown_timeout: Duration,
    handled: u64,
}

impl Runtime {
    /// Create a new Runtime. Send `IncomingMessage`s into the returned sender.
    pub fn new(dispatcher: Arc<Dispatcher>, shutdown_timeout: Duration) -> (Self, InputSender) {
        let (tx, rx) = input::channel(INPUT_BUFFER);
        let runtime = Self {
            dispatcher,
            shutdown: ShutdownGuard::new(),
            event_rx: rx,
            tracker: TaskTracker::new(),
            shutdown_timeout,
            handled: 0,
        };
        (runtime, tx)
    }

    /// Returns the cancellation token for spawning child tasks.
    pub fn token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Number of messages accepted so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Listen for OS signals, then run until the input closes or shutdown is requested.
    pub async fn run(&mut self) {
        self.shutdown.spawn_signal_listener();
        self.run_until_closed().await;
    }

    /// Main loop without OS signal handling.
    pub async fn run_until_closed(&mut self) {
        let token = self.shutdown.token();
        tracing::info!(bot = %self.dispatcher.identity().name, "nadeko runtime started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(
                        handled = self.handled,
                        "shutdown signal received, leaving event loop"
                    );
                    break;
                }
                msg = self.event_rx.recv() => {
                    let Some(msg) = msg else {
                        tracing::info!(handled = self.handled, "input closed, leaving event loop");
                        break;
                    };
                    self.handled += 1;
                    let id = msg.id;
                    // Puzzle transitions happen here, strictly in arrival order.
                    let work = match self.dispatcher.accept(msg).await {
                        Accepted::Done(route) => {
                            tracing::debug!(message = %id, route = ?route, "message handled");
                            continue;
                        }
                        Accepted::Pending(work) => work,
                    };
                    let dispatcher = Arc::clone(&self.dispatcher);
                    self.tracker.spawn(async move {
                        let route = dispatcher.finish(work).await;
                        tracing::debug!(message = %id, route = ?route, "message handled");
                    });
                }
            }
        }

        let drained = self.shutdown.drain(&self.tracker, self.shutdown_timeout).await;
        tracing::info!(drained, "nadeko runtime stopped");
    }
}
