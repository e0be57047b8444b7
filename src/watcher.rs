//! Background watcher feeding directory changes into the cached store.
//!
//! The notifier callback only forwards events into a channel. One consumer
//! thread debounces them per path and applies each settled change, and in
//! polling mode it also rescans on a fixed interval.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::cache::StoreState;
use crate::config::{StoreConfig, WatchFallback, WatchMode};
use crate::error::WatcherFatalError;

const MIN_TICK: Duration = Duration::from_millis(10);

enum Signal {
    Changed(PathBuf),
    Rescan,
    Failed(notify::Error),
    Shutdown,
}

pub struct DirectoryWatcher {
    tx: Sender<Signal>,
    notifier: Option<RecommendedWatcher>,
    polling: bool,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("notifying", &self.notifier.is_some())
            .field("polling", &self.polling)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl DirectoryWatcher {
    pub(crate) fn spawn(
        state: Arc<StoreState>,
        config: &StoreConfig,
    ) -> Result<Self, WatcherFatalError> {
        let (tx, rx) = mpsc::channel();

        let (notifier, polling) = match config.watch {
            WatchMode::Notify => match start_notifier(state.dir(), tx.clone()) {
                Ok(notifier) => (Some(notifier), false),
                Err(err) if config.fallback == WatchFallback::Poll => {
                    error!(
                        %err,
                        interval_ms = config.poll_interval.as_millis() as u64,
                        "filesystem notifications unavailable; falling back to polling"
                    );
                    (None, true)
                }
                Err(err) => return Err(err),
            },
            WatchMode::Poll => (None, true),
            WatchMode::Off => (None, false),
        };

        let debounce = config.debounce;
        let poll_interval = polling.then_some(config.poll_interval);
        let handle = std::thread::Builder::new()
            .name("javadoc-watcher".to_string())
            .spawn(move || run(state, rx, debounce, poll_interval))
            .map_err(WatcherFatalError::Spawn)?;

        // Catch anything that changed between the initial scan and the
        // notifier coming up.
        let _ = tx.send(Signal::Rescan);

        Ok(Self {
            tx,
            notifier,
            polling,
            handle: Some(handle),
        })
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Stops delivery, then waits for the consumer thread to exit.
    pub fn shutdown(&mut self) {
        self.notifier.take();
        let _ = self.tx.send(Signal::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("directory watcher thread panicked");
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_notifier(dir: &Path, tx: Sender<Signal>) -> Result<RecommendedWatcher, WatcherFatalError> {
    let watch_err = |source| WatcherFatalError::Watch {
        path: dir.to_path_buf(),
        source,
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event.need_rescan() {
                let _ = tx.send(Signal::Rescan);
            }
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                let _ = tx.send(Signal::Changed(path));
            }
        }
        Err(err) => {
            let _ = tx.send(Signal::Failed(err));
        }
    })
    .map_err(watch_err)?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(watch_err)?;
    Ok(watcher)
}

fn run(
    state: Arc<StoreState>,
    rx: Receiver<Signal>,
    debounce: Duration,
    poll_interval: Option<Duration>,
) {
    let mut tick = (debounce / 2).max(MIN_TICK);
    if let Some(interval) = poll_interval {
        tick = tick.min(interval);
    }

    info!(
        dir = %state.dir().display(),
        polling = poll_interval.is_some(),
        debounce_ms = debounce.as_millis() as u64,
        "directory watcher started"
    );

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut last_poll = Instant::now();

    loop {
        match rx.recv_timeout(tick) {
            Ok(Signal::Changed(reported)) => match state.archive_path(&reported) {
                Some(path) => {
                    pending.insert(path, Instant::now());
                }
                None => trace!(path = %reported.display(), "ignoring non-archive change"),
            },
            Ok(Signal::Rescan) => {
                // The rescan covers every pending path.
                pending.clear();
                state.reconcile();
            }
            Ok(Signal::Failed(err)) => {
                error!(%err, "file watcher reported an error; rescanning directory");
                pending.clear();
                state.reconcile();
            }
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let settled: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        for path in settled {
            pending.remove(&path);
            debug!(path = %path.display(), "applying archive change");
            state.apply(&path);
        }

        if let Some(interval) = poll_interval
            && last_poll.elapsed() >= interval
        {
            state.reconcile();
            last_poll = Instant::now();
        }
    }

    debug!("directory watcher stopped");
}
