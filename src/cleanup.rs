//! Exit-time release of remote resources.
//!
//! Every open remote session registers a hook here when it is created. A
//! hook runs at most once: it is either released by the owner after a
//! graceful shutdown, fired by the owner (or its drop) when the shutdown
//! could not happen, or fired by the signal watcher on SIGINT/SIGTERM.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Exit code after a termination signal.
const SIGNAL_EXIT_CODE: i32 = 130;

pub type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Hooks {
    next_id: u64,
    pending: BTreeMap<u64, (String, Hook)>,
}

#[derive(Clone, Default)]
pub struct CleanupRegistry {
    hooks: Arc<Mutex<Hooks>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, label: impl Into<String>, hook: Hook) -> CleanupHandle {
        let mut hooks = self.lock();
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.pending.insert(id, (label.into(), hook));
        CleanupHandle {
            registry: self.clone(),
            id,
        }
    }

    /// Fire every pending hook in registration order. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for (_, (label, hook)) in pending {
            log::info!("{} released", label);
            hook();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn take(&self, id: u64) -> Option<(String, Hook)> {
        self.lock().pending.remove(&id)
    }

    fn lock(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one registered hook. Dropping the handle fires the hook if
/// nothing else has.
pub struct CleanupHandle {
    registry: CleanupRegistry,
    id: u64,
}

impl CleanupHandle {
    /// Unregister without running. Returns false if the hook already ran.
    pub fn release(self) -> bool {
        self.registry.take(self.id).is_some()
    }

    /// Run the hook now. Returns false if it already ran.
    pub fn fire(self) -> bool {
        self.run()
    }

    fn run(&self) -> bool {
        match self.registry.take(self.id) {
            Some((label, hook)) => {
                log::debug!("{} released", label);
                hook();
                true
            }
            None => false,
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.run();
    }
}

/// Watch for SIGINT/SIGTERM on a dedicated thread; on delivery run every
/// pending hook and exit.
pub fn watch_signals(registry: CleanupRegistry) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            let signal = match runtime.block_on(wait_for_termination()) {
                Ok(signal) => signal,
                Err(e) => {
                    log::error!("Cannot listen for termination signals: {}", e);
                    return;
                }
            };
            log::warn!("{} received, closing remote sessions", signal);
            let released = registry.run_all();
            log::info!("Released {} remote session(s)", released);
            std::process::exit(SIGNAL_EXIT_CODE);
        })?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = hangup.recv() => Ok("SIGHUP"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Hook {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_release_skips_hook() {
        let registry = CleanupRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = registry.register("[a] shell", counting(&fired));
        assert_eq!(registry.pending(), 1);
        assert!(handle.release());
        assert_eq!(registry.pending(), 0);
        assert_eq!(registry.run_all(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fires_exactly_once() {
        let registry = CleanupRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = registry.register("[a] shell", counting(&fired));

        assert_eq!(registry.run_all(), 1);
        // Already fired by the watcher: neither the owner nor drop runs it again.
        assert!(!handle.fire());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_fires_pending_hook() {
        let registry = CleanupRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let _a = registry.register("[a] shell", counting(&fired));
            let b = registry.register("[b] shell", counting(&fired));
            b.release();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_run_all_in_registration_order() {
        let registry = CleanupRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            handles.push(registry.register(name, Box::new(move || order.lock().unwrap().push(name))));
        }
        assert_eq!(registry.run_all(), 3);
        drop(handles);
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }
}
