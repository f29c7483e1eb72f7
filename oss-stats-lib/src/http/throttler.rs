use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

/// A bounded worker pool gate with dispatch spacing and pausing.
///
/// Call [`Throttler::acquire`] before each unit of work and hold the permit for its
/// duration. At most `max_concurrent` permits are out at once, and consecutive
/// dispatches are at least `spacing` apart. Any task can call [`Throttler::pause_for`]
/// to halt new dispatches, e.g. after the upstream reported an exhausted rate limit.
///
/// When pauses overlap, the longest one wins.
#[derive(Debug)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
    spacing: Duration,
    next_dispatch: Mutex<Option<Instant>>,
    paused: AtomicBool,
    resume: Notify,
    resume_at: Mutex<Option<Instant>>,
}

impl Throttler {
    /// Minimum extension required for a new pause to override an active one, so
    /// concurrent tasks that saw the same reset time don't each extend the pause.
    const MIN_PAUSE_EXTENSION: Duration = Duration::from_secs(1);

    /// A throttler allowing `max_concurrent` tasks at a time, dispatched at least `spacing` apart.
    #[must_use]
    pub fn new(max_concurrent: usize, spacing: Duration) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            spacing,
            next_dispatch: Mutex::new(None),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            resume_at: Mutex::new(None),
        })
    }

    /// Wait until unpaused and a slot is free, then honour the dispatch spacing.
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        let permit = loop {
            if self.paused.load(Ordering::Acquire) {
                let notified = self.resume.notified();
                if self.paused.load(Ordering::Acquire) {
                    notified.await;
                }
                continue;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");

            // A pause may have started while we were queued for the permit
            if self.paused.load(Ordering::Acquire) {
                drop(permit);
                continue;
            }

            break permit;
        };

        if !self.spacing.is_zero() {
            let wait_until = {
                let mut next = self.next_dispatch.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                let slot = next.map_or(now, |n| n.max(now));
                *next = Some(slot + self.spacing);
                slot
            };
            tokio::time::sleep_until(wait_until).await;
        }

        permit
    }

    /// Returns whether the throttler is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause dispatching for `duration`, then automatically resume.
    ///
    /// Running tasks are not interrupted. Returns `true` only when a new pause is actually
    /// established; a pause of similar or longer length already in force makes this a no-op.
    pub fn pause_for(self: &Arc<Self>, duration: Duration) -> bool {
        let new_resume_at = Instant::now() + duration;

        {
            let mut guard = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some_and(|existing| existing + Self::MIN_PAUSE_EXTENSION >= new_resume_at) {
                return false;
            }
            *guard = Some(new_resume_at);
        }

        self.paused.store(true, Ordering::Release);
        let this = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::time::sleep_until(new_resume_at).await;

            let should_resume = {
                let mut guard = this.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.is_some_and(|t| Instant::now() >= t) {
                    *guard = None;
                    true
                } else {
                    // a longer pause was scheduled after us
                    false
                }
            };

            if should_resume {
                this.paused.store(false, Ordering::Release);
                this.resume.notify_waiters();
            }
        }));

        true
    }
}
