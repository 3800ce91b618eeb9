//! Heartbeat controller: periodic liveness pings while the connection is open.
//!
//! The controller only owns the timer. What a tick does (write a ping, check
//! the pong watchdog) is decided by the connection manager.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use rt_core::config::RealtimeConfig;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between heartbeat pings.
    pub interval: Duration,
    /// Treat the connection as dead when a ping goes unanswered for this long.
    /// Checked on each tick, so the effective deadline is the first tick at or
    /// after the window. `None` leaves liveness detection to the transport.
    pub pong_timeout: Option<Duration>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for HealthCheckConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// Owns at most one running heartbeat timer.
#[derive(Default)]
pub struct Heartbeat {
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `interval`, replacing any running timer.
    ///
    /// The first tick fires one full interval after start. The timer stops
    /// on its own once `tick` returns false.
    pub fn start<F>(&mut self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.stop();
        let period = interval.max(Duration::from_millis(1));
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        }));
    }

    /// Stop the timer. No tick runs after this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut heartbeat = Heartbeat::new();
        let t = ticks.clone();
        heartbeat.start(Duration::from_secs(30), move || {
            t.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(heartbeat.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut heartbeat = Heartbeat::new();
        let t = ticks.clone();
        heartbeat.start(Duration::from_secs(1), move || {
            t.fetch_add(1, Ordering::SeqCst);
            true
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        heartbeat.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!heartbeat.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_timer() {
        let mut heartbeat = Heartbeat::new();
        heartbeat.start(Duration::from_secs(1), || false);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!heartbeat.is_running());
    }

    #[test]
    fn test_config_from_realtime() {
        let mut realtime = RealtimeConfig::default();
        realtime.pong_timeout_ms = 60_000;
        let config = HealthCheckConfig::from(&realtime);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.pong_timeout, Some(Duration::from_secs(60)));
    }
}
