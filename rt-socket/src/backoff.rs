//! Reconnect backoff: the delay policy and the single pending-timer guard.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use rt_core::config::RealtimeConfig;

/// Configuration for socket reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
    /// Maximum number of consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) added to each delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for ReconnectConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            max_attempts: config.max_reconnect_attempts,
            jitter_factor: config.reconnect_jitter.clamp(0.0, 1.0),
        }
    }
}

impl ReconnectConfig {
    /// `min(base_delay * 2^attempt, max_delay)`.
    ///
    /// Sequence with defaults: 1s, 2s, 4s, 8s, 16s, then 30s forever.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`delay`](Self::delay) with +/- `jitter_factor` applied, never above `max_delay`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * secs * self.jitter_factor;
        Duration::from_secs_f64((secs + jitter).max(0.0)).min(self.max_delay)
    }

    /// Whether `attempt` (0-indexed) is past the configured cap.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

struct PendingReconnect {
    id: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

/// Owns at most one pending reconnect timer.
#[derive(Default)]
pub struct ReconnectScheduler {
    pending: Option<PendingReconnect>,
    next_id: u64,
}

impl ReconnectScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that runs `on_fire(id)` after `delay`.
    ///
    /// Returns `None` without scheduling when a timer is already pending.
    /// The fired task must call [`take_if_current`](Self::take_if_current)
    /// with its id before acting, since a cancel can race with the fire.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, on_fire: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.pending.is_some() {
            debug!("reconnect already pending, ignoring schedule request");
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            on_fire(id).await;
        });
        self.pending = Some(PendingReconnect { id, delay, handle });
        Some(id)
    }

    /// Abort the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Clear the pending marker if `id` is still the armed timer.
    pub fn take_if_current(&mut self, id: u64) -> bool {
        if self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Delay the pending timer was armed with.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.delay)
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_sequence_and_ceiling() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..7).map(|a| config.delay(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay(40), Duration::from_secs(30));
        assert_eq!(config.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = ReconnectConfig {
            jitter_factor: 0.3,
            ..ReconnectConfig::default()
        };
        for _ in 0..100 {
            let d = config.jittered_delay(2);
            assert!(d >= Duration::from_millis(2800));
            assert!(d <= Duration::from_millis(5200));
            assert!(config.jittered_delay(10) <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_exhausted() {
        let unlimited = ReconnectConfig::default();
        assert!(!unlimited.exhausted(1_000));

        let capped = ReconnectConfig { max_attempts: 3, ..ReconnectConfig::default() };
        assert!(!capped.exhausted(2));
        assert!(capped.exhausted(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_is_ignored() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut scheduler = ReconnectScheduler::new();

        let f = fired.clone();
        let first = scheduler.schedule(Duration::from_secs(1), move |id| async move {
            f.store(id, Ordering::SeqCst);
        });
        let second = scheduler.schedule(Duration::from_millis(10), |_| async {});
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(scheduler.pending_delay(), Some(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), first.unwrap());
        assert!(scheduler.take_if_current(first.unwrap()));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut scheduler = ReconnectScheduler::new();

        let f = fired.clone();
        let id = scheduler
            .schedule(Duration::from_secs(1), move |id| async move {
                f.store(id, Ordering::SeqCst);
            })
            .unwrap();
        assert!(scheduler.cancel());
        assert!(!scheduler.take_if_current(id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.cancel());
    }
}
