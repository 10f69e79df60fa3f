//! Periodic flush of the editing session.
//!
//! The task ticks every `interval`, persisting the active pad and the pad list.
//! `stop()` cancels it and performs one final flush before returning.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::session::PadSession;
use crate::logging::Logger;

pub struct Autosaver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Autosaver {
    pub fn start(session: Arc<Mutex<PadSession>>, interval: Duration, log: Logger) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        log.trace(format_args!("Periodic save: {}", chrono::Local::now()));
                        flush(&session, &log);
                    }
                }
            }

            log.info(format_args!("Stopping, final save"));
            flush(&session, &log);
        });

        Self { token, handle }
    }

    /// Cancel the timer and wait for the final flush
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            log::error!("[AUTOSAVE] Task ended abnormally: {}", e);
        }
    }
}

fn flush(session: &Mutex<PadSession>, log: &Logger) {
    if let Err(e) = session.lock().flush() {
        log.warn(format_args!("Failed to save pads: {}", e));
    }
}
