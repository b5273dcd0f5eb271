//! Transmission pacing for the shared, low-bandwidth bearer.
//!
//! Every outgoing request first waits until at least the configured send
//! interval has elapsed since the previous transmission, whatever that
//! previous call's outcome was.

use log::debug;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration, Instant};

use super::{CallParams, TransportError};

#[derive(Debug, Default)]
pub struct Pacer {
    last_send: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait out whatever remains of `gap` since the last transmission.
    pub async fn wait(&mut self, gap: Duration) {
        if let Some(last) = self.last_send {
            let elapsed = last.elapsed();
            if elapsed < gap {
                let wait = gap - elapsed;
                debug!(
                    "Pacing: waiting {}ms to respect {}ms between transmissions",
                    wait.as_millis(),
                    gap.as_millis()
                );
                sleep(wait).await;
            }
        }
    }

    pub fn mark_sent(&mut self) {
        self.last_send = Some(Instant::now());
    }

    /// Pace, mark the transmission and run `call` under `params.timeout`.
    pub async fn run<F, T>(&mut self, params: CallParams, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        self.wait(params.send_interval).await;
        self.mark_sent();
        match timeout(params.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(params.timeout)),
        }
    }
}
