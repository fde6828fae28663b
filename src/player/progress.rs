//! Progress ticker thread
//!
//! While playing, a named thread samples the engine clock at a fixed
//! cadence, advances the playhead and delivers handlers. It sleeps on a
//! channel so dropping the sender ends it without waiting for a tick.
//!
//! Ticks hold the controller's delivery gate for the whole
//! compute-and-deliver step. Control calls take the same gate, so no
//! handler runs after `stop`, `pause` or `prepare` has returned. Handlers
//! may call back into the controller: the thread marks itself as
//! delivering and control calls made from inside a handler skip the gate.

use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::Shared;
use crate::engine::RenderEngine;
use crate::sync::lock;

thread_local! {
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as delivering for one controller
pub(super) struct DeliveryScope {
    key: usize,
}

impl DeliveryScope {
    pub(super) fn enter(shared: &Shared) -> Self {
        let key = shared as *const Shared as usize;
        DELIVERING.with(|d| d.borrow_mut().push(key));
        Self { key }
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|d| {
            let mut keys = d.borrow_mut();
            if let Some(i) = keys.iter().rposition(|k| *k == self.key) {
                keys.remove(i);
            }
        });
    }
}

/// Whether the current thread already holds `shared`'s delivery gate
pub(super) fn is_delivering(shared: &Shared) -> bool {
    let key = shared as *const Shared as usize;
    DELIVERING.with(|d| d.borrow().contains(&key))
}

/// Start a ticker for `generation`. Drop the returned sender to end it.
pub(super) fn spawn(
    shared: Arc<Shared>,
    engine: Arc<dyn RenderEngine>,
    generation: u64,
    interval: Duration,
) -> io::Result<Sender<()>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    thread::Builder::new()
        .name("preview-progress".into())
        .spawn(move || {
            debug!("[PROGRESS] Ticker {} started", generation);
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if !tick(&shared, engine.as_ref(), generation) {
                    break;
                }
            }
            debug!("[PROGRESS] Ticker {} exited", generation);
        })?;

    Ok(shutdown_tx)
}

/// One sample of the engine clock. Returns false when the ticker should exit.
fn tick(shared: &Shared, engine: &dyn RenderEngine, generation: u64) -> bool {
    let _gate = lock(&shared.delivery);
    let _scope = DeliveryScope::enter(shared);

    let (position, finished) = {
        let mut inner = lock(&shared.inner);
        if inner.generation != generation || !inner.transport.is_playing() {
            return false;
        }

        let reached_end = inner.transport.advance_to(engine.position());
        let position = inner.transport.current_time();

        let finished = if reached_end {
            engine.halt();
            inner.transport.finish();
            if let Err(e) = engine.seek(inner.transport.current_time()) {
                warn!("[PROGRESS] Rewind after completion failed: {}", e);
            }
            inner.stop_ticker();
            Some(
                inner
                    .session
                    .as_ref()
                    .and_then(|s| s.track_info.background_track().map(Path::to_path_buf)),
            )
        } else {
            None
        };

        (position, finished)
    };

    shared.deliver_progress(position);

    match finished {
        Some(background) => {
            info!("[PROGRESS] Playback finished at {:.3}s", position);
            shared.deliver_finished(background.as_deref());
            false
        }
        None => true,
    }
}
