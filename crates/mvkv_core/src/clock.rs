//! Global transaction clock.
//!
//! Every committing transaction advances the clock exactly once and uses the
//! new value as its commit tid. Snapshots read the current value.

use crate::error::{CoreError, CoreResult};
use crate::types::Tid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL_CLOCK: OnceLock<Arc<GlobalClock>> = OnceLock::new();

/// Monotonically increasing tid counter.
///
/// A process normally uses the single instance returned by
/// [`GlobalClock::global`]. Tests and embedders that want isolated tid
/// sequences may construct private clocks with [`GlobalClock::new`].
#[derive(Debug)]
pub struct GlobalClock {
    /// Tid of the last commit.
    tid: AtomicU64,
}

impl GlobalClock {
    /// Creates a private clock whose current value is `start`.
    pub fn new(start: u64) -> Self {
        Self {
            tid: AtomicU64::new(start),
        }
    }

    /// Initializes the process-wide clock at `start`.
    ///
    /// Fails if the clock was already initialized, explicitly or by an
    /// earlier call to [`GlobalClock::global`].
    pub fn init(start: u64) -> CoreResult<Arc<GlobalClock>> {
        let mut installed = false;
        let clock = GLOBAL_CLOCK.get_or_init(|| {
            installed = true;
            Arc::new(GlobalClock::new(start))
        });
        if installed {
            Ok(Arc::clone(clock))
        } else {
            Err(CoreError::ClockAlreadyInitialized {
                current: clock.current(),
            })
        }
    }

    /// Returns the process-wide clock, initializing it at zero on first use.
    pub fn global() -> Arc<GlobalClock> {
        Arc::clone(GLOBAL_CLOCK.get_or_init(|| Arc::new(GlobalClock::new(0))))
    }

    /// Returns the tid of the last commit.
    #[must_use]
    pub fn current(&self) -> Tid {
        Tid::new(self.tid.load(Ordering::SeqCst))
    }

    /// Atomically increments the clock and returns the new tid.
    ///
    /// The increment is a sequentially consistent RMW, so a committer that locked
    /// its records before advancing is ordered before any committer that
    /// advances later and then inspects those records.
    pub fn advance(&self) -> Tid {
        Tid::new(self.tid.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn advance_returns_new_value() {
        let clock = GlobalClock::new(5);
        assert_eq!(clock.current(), Tid::new(5));
        assert_eq!(clock.advance(), Tid::new(6));
        assert_eq!(clock.current(), Tid::new(6));
    }

    #[test]
    fn concurrent_advances_are_unique() {
        let clock = Arc::new(GlobalClock::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..1000).map(|_| clock.advance()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Tid> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(clock.current(), Tid::new(4000));
    }

    #[test]
    fn global_is_initialized_once() {
        let first = GlobalClock::global();
        let second = GlobalClock::global();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            GlobalClock::init(100),
            Err(CoreError::ClockAlreadyInitialized { .. })
        ));
    }
}
