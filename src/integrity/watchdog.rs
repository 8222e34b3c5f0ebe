//! Self-heal watchdog.
//!
//! One background thread loops `heal()` on a fixed interval until its
//! cancellation token fires. At most one patrol runs in the process:
//! starting a watchdog while any patrol is active is a no-op. The
//! process-wide instance is reached through [`global`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::engine::config::ShieldConfig;
use crate::error::{Result, ShieldError};
use crate::integrity::{heal, HealOutcome};

static GLOBAL: OnceLock<Watchdog> = OnceLock::new();

/// Held by the one running patrol, across every [`Watchdog`].
static PATROL_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Releases [`PATROL_ACTIVE`] when the patrol thread exits, panics included.
struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        PATROL_ACTIVE.store(false, Ordering::Release);
    }
}

/// The process-wide watchdog, with the interval from [`ShieldConfig::from_env`].
pub fn global() -> &'static Watchdog {
    GLOBAL.get_or_init(|| Watchdog::new(ShieldConfig::from_env().heal_interval))
}

/// Cancellation flag the patrol sleeps on, so a stop does not wait out
/// the interval.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub fn cancel(&self) {
        *lock(&self.cancelled) = true;
        self.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }

    /// Sleeps up to `timeout`. Returns true if cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = lock(&self.cancelled);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = self
                .wake
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[derive(Debug, Default)]
struct PatrolStats {
    iterations: AtomicU64,
    heals: AtomicU64,
    failures: AtomicU64,
}

struct Patrol {
    token: Arc<CancelToken>,
    handle: JoinHandle<()>,
}

pub struct Watchdog {
    interval: Duration,
    stats: Arc<PatrolStats>,
    patrol: Mutex<Option<Patrol>>,
}

impl Watchdog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stats: Arc::new(PatrolStats::default()),
            patrol: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arms the watchdog. Returns `Ok(false)` if a patrol is already
    /// running, on this watchdog or any other.
    pub fn start(&self) -> Result<bool> {
        let mut patrol = lock(&self.patrol);
        if patrol.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return Ok(false);
        }
        if PATROL_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("[WATCHDOG] another patrol is already running");
            return Ok(false);
        }

        let token = Arc::new(CancelToken::default());
        let spawned = thread::Builder::new()
            .name("integrity-watchdog".into())
            .spawn({
                let token = Arc::clone(&token);
                let stats = Arc::clone(&self.stats);
                let interval = self.interval;
                move || {
                    let _active = ActiveGuard;
                    run_patrol(&token, interval, &stats, heal)
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                PATROL_ACTIVE.store(false, Ordering::Release);
                return Err(ShieldError::Spawn(err));
            }
        };

        *patrol = Some(Patrol { token, handle });
        info!("[WATCHDOG] armed, interval {:?}", self.interval);
        Ok(true)
    }

    /// Cancels the patrol and waits for its thread. Returns false if none
    /// was running.
    pub fn stop(&self) -> bool {
        let Some(patrol) = lock(&self.patrol).take() else {
            return false;
        };
        patrol.token.cancel();
        if patrol.handle.join().is_err() {
            error!("[WATCHDOG] patrol thread panicked");
        }
        info!("[WATCHDOG] stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.patrol)
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Loop iterations across every patrol this watchdog has run.
    pub fn iterations(&self) -> u64 {
        self.stats.iterations.load(Ordering::Relaxed)
    }

    /// Successful repairs.
    pub fn heals(&self) -> u64 {
        self.stats.heals.load(Ordering::Relaxed)
    }

    /// Repairs that could not be written or did not stick.
    pub fn heal_failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// True while any watchdog in the process has a patrol running.
pub fn patrol_active() -> bool {
    PATROL_ACTIVE.load(Ordering::Acquire)
}

fn run_patrol<H>(token: &CancelToken, interval: Duration, stats: &PatrolStats, heal: H)
where
    H: Fn() -> HealOutcome,
{
    loop {
        stats.iterations.fetch_add(1, Ordering::Relaxed);
        match heal() {
            HealOutcome::Intact => {}
            HealOutcome::Healed => {
                stats.heals.fetch_add(1, Ordering::Relaxed);
                warn!("[WATCHDOG] function tampered, healed");
            }
            HealOutcome::Failed(err) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                error!("[WATCHDOG] heal failed: {}", err);
            }
        }
        if token.wait(interval) {
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
