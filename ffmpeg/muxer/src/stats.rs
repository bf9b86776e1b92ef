/*!
    Statistics exposed by the muxer for external polling.

    Every stat reports a value for the window since its previous read.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/**
    A value that can be polled.
*/
pub trait Stat: Send + Sync {
    fn value(&self) -> f64;
}

/**
    Describes a registered stat.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatMetadata {
    pub label: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
}

/**
    One polled value.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct StatSample {
    pub label: &'static str,
    pub unit: &'static str,
    pub value: f64,
}

/**
    Events per second since the previous read.

    `add` is lock-free and may be called from any thread.
*/
#[derive(Debug)]
pub struct CounterRateStat {
    count: AtomicU64,
    since: Mutex<Instant>,
}

impl CounterRateStat {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            since: Mutex::new(Instant::now()),
        }
    }

    pub fn add(&self, delta: u64) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    fn rate(&self, now: Instant) -> f64 {
        let mut since = self.since.lock();
        let elapsed = now.saturating_duration_since(*since);
        *since = now;
        let count = self.count.swap(0, Ordering::Relaxed);
        if elapsed.is_zero() {
            return 0.0;
        }
        count as f64 / elapsed.as_secs_f64()
    }
}

impl Default for CounterRateStat {
    fn default() -> Self {
        Self::new()
    }
}

impl Stat for CounterRateStat {
    fn value(&self) -> f64 {
        self.rate(Instant::now())
    }
}

#[derive(Debug)]
struct WorkWindow {
    since: Instant,
    busy: Duration,
    begun_at: Option<Instant>,
}

/**
    Percentage of wall time spent between `begin` and `end` since the previous read.

    A region still open at read time counts up to the read.
*/
#[derive(Debug)]
pub struct DurationPercentageStat {
    window: Mutex<WorkWindow>,
}

impl DurationPercentageStat {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(WorkWindow {
                since: Instant::now(),
                busy: Duration::ZERO,
                begun_at: None,
            }),
        }
    }

    pub fn begin(&self) {
        self.window.lock().begun_at = Some(Instant::now());
    }

    pub fn end(&self) {
        let mut window = self.window.lock();
        if let Some(begun_at) = window.begun_at.take() {
            let start = begun_at.max(window.since);
            window.busy += Instant::now().saturating_duration_since(start);
        }
    }

    fn percentage(&self, now: Instant) -> f64 {
        let mut window = self.window.lock();
        let mut busy = window.busy;
        if let Some(begun_at) = window.begun_at {
            busy += now.saturating_duration_since(begun_at.max(window.since));
        }

        let elapsed = now.saturating_duration_since(window.since);
        window.since = now;
        window.busy = Duration::ZERO;

        if elapsed.is_zero() {
            return 0.0;
        }
        (busy.as_secs_f64() / elapsed.as_secs_f64() * 100.0).min(100.0)
    }
}

impl Default for DurationPercentageStat {
    fn default() -> Self {
        Self::new()
    }
}

impl Stat for DurationPercentageStat {
    fn value(&self) -> f64 {
        self.percentage(Instant::now())
    }
}

/**
    An instantaneous value read through a closure.
*/
pub struct GaugeStat {
    read: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl GaugeStat {
    pub fn new<F>(read: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self {
            read: Box::new(read),
        }
    }
}

impl Stat for GaugeStat {
    fn value(&self) -> f64 {
        (self.read)()
    }
}

/**
    Registry of the stats a node exposes.
*/
#[derive(Default)]
pub struct Stater {
    stats: Mutex<Vec<(StatMetadata, Arc<dyn Stat>)>>,
}

impl Stater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stat(&self, metadata: StatMetadata, stat: Arc<dyn Stat>) {
        self.stats.lock().push((metadata, stat));
    }

    /**
        Registered stats, in registration order.
    */
    pub fn stats(&self) -> Vec<(StatMetadata, Arc<dyn Stat>)> {
        self.stats.lock().clone()
    }

    /**
        Read every stat once.
    */
    pub fn poll(&self) -> Vec<StatSample> {
        self.stats
            .lock()
            .iter()
            .map(|(metadata, stat)| StatSample {
                label: metadata.label,
                unit: metadata.unit,
                value: stat.value(),
            })
            .collect()
    }
}

impl std::fmt::Debug for Stater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<_> = self.stats.lock().iter().map(|(m, _)| m.label).collect();
        f.debug_struct("Stater").field("stats", &labels).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn counter_rate_is_per_second_and_resets() {
        let stat = CounterRateStat::new();
        let start = *stat.since.lock();
        stat.add(10);
        stat.add(5);

        let rate = stat.rate(start + Duration::from_millis(500));
        assert!((rate - 30.0).abs() < 1e-9);

        let rate = stat.rate(start + Duration::from_millis(1500));
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn counter_rate_accepts_concurrent_adds() {
        let stat = Arc::new(CounterRateStat::new());
        let start = *stat.since.lock();
        thread::scope(|s| {
            for _ in 0..4 {
                let stat = Arc::clone(&stat);
                s.spawn(move || {
                    for _ in 0..250 {
                        stat.add(1);
                    }
                });
            }
        });

        let rate = stat.rate(start + Duration::from_secs(1));
        assert!((rate - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn work_ratio_measures_busy_time() {
        let stat = DurationPercentageStat::new();
        stat.begin();
        thread::sleep(Duration::from_millis(20));
        stat.end();

        let since = stat.window.lock().since;
        let busy = stat.window.lock().busy;
        assert!(busy >= Duration::from_millis(20));

        let ratio = stat.percentage(since + busy * 2);
        assert!((ratio - 50.0).abs() < 1e-6);
    }

    #[test]
    fn work_ratio_counts_open_region() {
        let stat = DurationPercentageStat::new();
        let since = stat.window.lock().since;
        stat.window.lock().begun_at = Some(since);

        let ratio = stat.percentage(since + Duration::from_millis(100));
        assert!((ratio - 100.0).abs() < 1e-6);
    }

    #[test]
    fn stater_polls_in_registration_order() {
        let stater = Stater::new();
        stater.add_stat(
            StatMetadata {
                label: "First",
                description: "first",
                unit: "x",
            },
            Arc::new(GaugeStat::new(|| 1.0)),
        );
        stater.add_stat(
            StatMetadata {
                label: "Second",
                description: "second",
                unit: "y",
            },
            Arc::new(GaugeStat::new(|| 2.0)),
        );

        let samples = stater.poll();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, "First");
        assert_eq!(samples[1].value, 2.0);
        assert_eq!(stater.stats().len(), 2);
    }
}
