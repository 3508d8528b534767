//! Cancellable one-shot timer
//!
//! A single `armed` flag plus a generation counter decide whether a fire
//! notification still counts. Rearming always disarms first, so at most one
//! pending fire is ever accepted.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct CancellableTimer {
    generation: u64,
    armed: bool,
    token: Option<CancellationToken>,
    fired_tx: mpsc::UnboundedSender<u64>,
}

impl CancellableTimer {
    /// Create a timer and the receiver its fire notifications (generations) arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                generation: 0,
                armed: false,
                token: None,
                fired_tx,
            },
            fired_rx,
        )
    }

    /// Arm for `after`, replacing any pending deadline. Returns the new generation.
    pub fn arm(&mut self, after: Duration) -> u64 {
        self.disarm();
        self.generation += 1;
        self.armed = true;

        let generation = self.generation;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        let tx = self.fired_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(generation);
                }
            }
        });

        generation
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consume a fire notification. Only the current armed generation is
    /// accepted; accepting disarms the timer.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.armed && generation == self.generation {
            self.armed = false;
            self.token = None;
            true
        } else {
            false
        }
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
