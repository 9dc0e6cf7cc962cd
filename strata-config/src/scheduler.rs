//! CPU-aware polling interval.
//!
//! The hot-reload watcher polls the user file on an interval that backs off
//! while the machine is busy and tightens again once it is idle.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Lower bound for adaptive shrinking.
pub const MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for adaptive growth.
pub const MAX_INTERVAL: Duration = Duration::from_secs(10);

const GROWTH: f64 = 1.5;
const SHRINK: f64 = 1.2;

/// Error type for CPU sampling.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("CPU statistics unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse CPU statistics: {0}")]
    Parse(String),
}

/// Source of CPU load samples, in percent of total capacity.
pub trait CpuSampler: Send {
    fn sample(&mut self) -> Result<f32, SampleError>;
}

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Samples aggregate CPU load from `/proc/stat`.
///
/// The first sample covers the time since boot; later samples cover the
/// time since the previous one.
#[derive(Debug)]
pub struct ProcStatSampler {
    path: PathBuf,
    previous: Option<CpuTimes>,
}

impl ProcStatSampler {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            previous: None,
        }
    }

    fn read_times(&self) -> Result<CpuTimes, SampleError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| SampleError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        parse_cpu_line(&text)
    }
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for ProcStatSampler {
    fn sample(&mut self) -> Result<f32, SampleError> {
        let now = self.read_times()?;
        let (busy, total) = match self.previous {
            Some(prev) => (
                now.busy.saturating_sub(prev.busy),
                now.total.saturating_sub(prev.total),
            ),
            None => (now.busy, now.total),
        };
        self.previous = Some(now);

        if total == 0 {
            return Ok(0.0);
        }
        Ok((busy as f64 / total as f64 * 100.0) as f32)
    }
}

fn parse_cpu_line(text: &str) -> Result<CpuTimes, SampleError> {
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Parse("missing aggregate cpu line".to_string()))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>().map_err(|e| SampleError::Parse(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    if fields.len() < 4 {
        return Err(SampleError::Parse(format!("expected at least 4 fields, got {}", fields.len())));
    }

    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    // guest time is already counted in user/nice
    let total: u64 = fields.iter().take(8).sum();

    Ok(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// Adjusts a polling interval according to sampled CPU load.
pub struct ResourceAdaptiveScheduler {
    interval: Duration,
    max_cpu_percent: f32,
    check_interval: Duration,
    last_check: Option<Instant>,
    sampler: Box<dyn CpuSampler>,
}

impl ResourceAdaptiveScheduler {
    pub fn new(
        interval: Duration,
        max_cpu_percent: f32,
        check_interval: Duration,
        sampler: Box<dyn CpuSampler>,
    ) -> Self {
        Self {
            interval,
            max_cpu_percent,
            check_interval,
            last_check: None,
            sampler,
        }
    }

    /// A scheduler backed by [`ProcStatSampler`].
    pub fn with_proc_stat(interval: Duration, max_cpu_percent: f32, check_interval: Duration) -> Self {
        Self::new(
            interval,
            max_cpu_percent,
            check_interval,
            Box::new(ProcStatSampler::new()),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn max_cpu_percent(&self) -> f32 {
        self.max_cpu_percent
    }

    /// Samples the CPU if `check_interval` has elapsed and returns the current interval.
    pub fn adjust(&mut self) -> Duration {
        self.adjust_at(Instant::now())
    }

    pub fn adjust_at(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) < self.check_interval {
                return self.interval;
            }
        }
        self.last_check = Some(now);

        match self.sampler.sample() {
            Ok(cpu) => self.apply_sample(cpu),
            Err(e) => {
                debug!(error = %e, "CPU sample failed, keeping poll interval");
                self.interval
            }
        }
    }

    /// Applies one CPU reading to the interval.
    pub fn apply_sample(&mut self, cpu_percent: f32) -> Duration {
        let previous = self.interval;
        if cpu_percent > self.max_cpu_percent {
            self.interval = self.interval.mul_f64(GROWTH).min(MAX_INTERVAL);
        } else if cpu_percent < self.max_cpu_percent / 2.0 {
            self.interval = self.interval.div_f64(SHRINK).max(MIN_INTERVAL);
        }

        if self.interval != previous {
            debug!(
                cpu_percent,
                from_ms = previous.as_millis() as u64,
                to_ms = self.interval.as_millis() as u64,
                "Adjusted poll interval"
            );
        }
        self.interval
    }
}

impl std::fmt::Debug for ResourceAdaptiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAdaptiveScheduler")
            .field("interval", &self.interval)
            .field("max_cpu_percent", &self.max_cpu_percent)
            .field("check_interval", &self.check_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;

    struct Scripted(VecDeque<Result<f32, SampleError>>);

    impl CpuSampler for Scripted {
        fn sample(&mut self) -> Result<f32, SampleError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(SampleError::Unavailable("script exhausted".into())))
        }
    }

    fn scheduler(interval_ms: u64, samples: Vec<Result<f32, SampleError>>) -> ResourceAdaptiveScheduler {
        ResourceAdaptiveScheduler::new(
            Duration::from_millis(interval_ms),
            50.0,
            Duration::from_secs(5),
            Box::new(Scripted(samples.into())),
        )
    }

    #[test]
    fn test_backs_off_when_busy() {
        let mut s = scheduler(1000, vec![]);
        assert_eq!(s.apply_sample(80.0), Duration::from_millis(1500));
        s.set_interval(Duration::from_secs(9));
        assert_eq!(s.apply_sample(80.0), MAX_INTERVAL);
    }

    #[test]
    fn test_tightens_when_idle() {
        let mut s = scheduler(1200, vec![]);
        assert_eq!(s.apply_sample(10.0), Duration::from_millis(1000));
        s.set_interval(Duration::from_millis(550));
        assert_eq!(s.apply_sample(10.0), MIN_INTERVAL);
    }

    #[test]
    fn test_moderate_load_keeps_interval() {
        let mut s = scheduler(1000, vec![]);
        assert_eq!(s.apply_sample(30.0), Duration::from_millis(1000));
        assert_eq!(s.apply_sample(50.0), Duration::from_millis(1000));
    }

    #[test]
    fn test_respects_check_interval_and_sampling_errors() {
        let mut s = scheduler(
            1000,
            vec![Err(SampleError::Unavailable("nope".into())), Ok(90.0), Ok(90.0)],
        );
        let start = Instant::now();

        assert_eq!(s.adjust_at(start), Duration::from_millis(1000));
        // too soon, the scripted sample is not consumed
        assert_eq!(s.adjust_at(start + Duration::from_secs(1)), Duration::from_millis(1000));
        assert_eq!(s.adjust_at(start + Duration::from_secs(5)), Duration::from_millis(1500));
        assert_eq!(s.adjust_at(start + Duration::from_secs(10)), Duration::from_millis(2250));
    }

    #[test]
    fn test_proc_stat_sampler() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stat");
        let write = |line: &str| {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{}", line).unwrap();
            writeln!(f, "cpu0 1 2 3 4 5 6 7 8 0 0").unwrap();
        };

        write("cpu  100 0 100 800 0 0 0 0 0 0");
        let mut sampler = ProcStatSampler::with_path(&path);
        assert!((sampler.sample().unwrap() - 20.0).abs() < 0.01);

        // +150 busy, +50 idle since the previous read
        write("cpu  200 0 150 850 0 0 0 0 0 0");
        assert!((sampler.sample().unwrap() - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_proc_stat_missing_file() {
        let mut sampler = ProcStatSampler::with_path("/definitely/not/here");
        assert!(matches!(sampler.sample(), Err(SampleError::Unavailable(_))));
    }
}
