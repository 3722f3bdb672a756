use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::connection::SendStatus;
use super::registry::Registry;

/// Configuration for heartbeat monitoring
#[derive(Clone, Debug)]
pub struct HeartbeatConfig {
    /// Interval between liveness cycles
    pub interval: Duration,
}

impl HeartbeatConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Stats for heartbeat monitoring
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub total_cycles: u64,
    pub total_pings: u64,
    pub total_evictions: u64,
}

/// What one cycle did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pinged: usize,
    pub evicted: usize,
}

/// Liveness Supervisor.
///
/// Every cycle, a connection that has not answered the previous ping is
/// terminated and unregistered; every other connection is marked not-alive
/// and pinged. A pong (see [`Registry::mark_alive`]) before the next cycle
/// keeps it.
pub struct LivenessSupervisor {
    registry: Arc<Registry>,
    config: HeartbeatConfig,
    total_cycles: AtomicU64,
    total_pings: AtomicU64,
    total_evictions: AtomicU64,
}

impl LivenessSupervisor {
    pub fn new(registry: Arc<Registry>, config: HeartbeatConfig) -> Self {
        Self {
            registry,
            config,
            total_cycles: AtomicU64::new(0),
            total_pings: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub fn run_cycle(&self) -> CycleReport {
        let sweep = self.registry.sweep();
        let mut report = CycleReport {
            evicted: sweep.evicted.len(),
            ..CycleReport::default()
        };

        for handle in &sweep.evicted {
            log::info!("connection {} missed heartbeat, terminating", handle.id());
            handle.terminate();
        }
        for handle in &sweep.probed {
            if handle.ping() == SendStatus::Queued {
                report.pinged += 1;
            }
        }

        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.total_pings
            .fetch_add(report.pinged as u64, Ordering::Relaxed);
        self.total_evictions
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        if report.evicted > 0 {
            log::debug!(
                "heartbeat cycle: pinged={} evicted={}",
                report.pinged,
                report.evicted
            );
        }
        report
    }

    /// Run cycles on the configured period until the task is aborted.
    /// The first cycle runs one full period after spawning.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_cycle();
            }
        })
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            total_pings: self.total_pings.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::Outbound;

    #[test]
    fn test_single_missed_probe_is_tolerated() {
        let registry = Arc::new(Registry::new());
        let (h, _s) = registry.open();
        registry.register(h.clone());
        let supervisor = LivenessSupervisor::new(Arc::clone(&registry), HeartbeatConfig::default());

        assert_eq!(supervisor.run_cycle(), CycleReport { pinged: 1, evicted: 0 });
        registry.mark_alive(h.id());
        assert_eq!(supervisor.run_cycle(), CycleReport { pinged: 1, evicted: 0 });
        assert_eq!(supervisor.run_cycle(), CycleReport { pinged: 0, evicted: 1 });
        assert!(registry.is_empty());
        assert!(!h.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_eviction() {
        let registry = Arc::new(Registry::new());
        let (silent, mut silent_stream) = registry.open();
        let (chatty, _chatty_stream) = registry.open();
        registry.register(silent.clone());
        registry.register(chatty.clone());
        registry.subscribe(3, silent.id());
        registry.subscribe(3, chatty.id());

        let supervisor = Arc::new(LivenessSupervisor::new(
            Arc::clone(&registry),
            HeartbeatConfig::default(),
        ));
        let task = Arc::clone(&supervisor).spawn();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(supervisor.stats().total_cycles, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(supervisor.stats().total_cycles, 1);
        assert_eq!(silent_stream.outbound.try_recv().unwrap(), Outbound::Ping);
        registry.mark_alive(chatty.id());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(supervisor.stats().total_cycles, 2);
        assert!(!registry.contains(silent.id()));
        assert!(registry.contains(chatty.id()));
        assert_eq!(registry.subscriptions_of(silent.id()), Vec::<i64>::new());
        assert_eq!(registry.subscribers(3).unwrap().len(), 1);
        assert!(*silent_stream.shutdown.borrow());
        registry.assert_consistent();

        task.abort();
    }
}
