//! CPU counter sampling and usage arithmetic.
//!
//! Counters come from the aggregate `cpu` line of `/proc/stat`. Two snapshots
//! are differenced into [`Deltas`], which [`percentages`] turns into integer
//! usage percentages.

use crate::metric::MetricName;
use hostcheck_rs_core::CheckError;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Cumulative tick counters for every CPU state at one instant.
///
/// All values are in "jiffies" (clock ticks) since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    values: [u64; 10],
}

impl CounterSnapshot {
    /// Fewest fields accepted on the `cpu` line (up to and including `steal`).
    pub const MIN_FIELDS: usize = 8;

    /// Build a snapshot from `(metric, ticks)` pairs; unnamed metrics are 0.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (MetricName, u64)>,
    {
        let mut snapshot = Self::default();
        for (metric, ticks) in pairs {
            snapshot.values[metric.index()] = ticks;
        }
        snapshot
    }

    /// Ticks accumulated in `metric`.
    #[must_use]
    pub const fn get(&self, metric: MetricName) -> u64 {
        self.values[metric.index()]
    }

    /// Parse the aggregate `cpu` line out of full `/proc/stat` content.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::SourceUnavailable`] if there is no aggregate line
    /// or it is malformed.
    pub fn parse(content: &str) -> Result<Self, CheckError> {
        let line = content
            .lines()
            .find(|line| is_aggregate_line(line))
            .ok_or_else(|| CheckError::source_unavailable("No aggregate cpu line found"))?;

        Self::parse_line(line)
    }

    /// Parse one aggregate `cpu` line.
    ///
    /// Kernels before 2.6.24 lack `guest` and kernels before 2.6.33 lack
    /// `guest_nice`; missing trailing fields read as 0. Fields past
    /// `guest_nice` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::SourceUnavailable`] if the line does not start
    /// with `cpu`, has fewer than [`Self::MIN_FIELDS`] fields, or contains a
    /// non-numeric field.
    pub fn parse_line(line: &str) -> Result<Self, CheckError> {
        if !is_aggregate_line(line) {
            return Err(CheckError::source_unavailable(format!(
                "Not an aggregate cpu line: {:?}",
                line
            )));
        }

        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(MetricName::ALL.len())
            .map(str::parse::<u64>)
            .collect::<Result<_, _>>()
            .map_err(|e| CheckError::source_unavailable_with("Failed to parse CPU counters", e))?;

        if values.len() < Self::MIN_FIELDS {
            return Err(CheckError::source_unavailable(format!(
                "Insufficient CPU counters: expected at least {}, got {}",
                Self::MIN_FIELDS,
                values.len()
            )));
        }

        let mut snapshot = Self::default();
        snapshot.values[..values.len()].copy_from_slice(&values);
        Ok(snapshot)
    }
}

fn is_aggregate_line(line: &str) -> bool {
    line.strip_prefix("cpu")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

/// Anything that can produce the current CPU counters.
pub trait CounterSource {
    /// Read the counters as they are right now.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::SourceUnavailable`] if the counters cannot be
    /// read or parsed.
    fn read(&mut self) -> Result<CounterSnapshot, CheckError>;

    /// Check that the source can be read at all.
    ///
    /// Default implementation returns `Ok(())`.
    fn check_availability(&self) -> Result<(), CheckError> {
        Ok(())
    }
}

/// Counter source backed by the kernel's `/proc/stat`.
#[derive(Debug, Clone)]
pub struct ProcStatSource {
    path: PathBuf,
}

impl ProcStatSource {
    /// Path to the proc stat file.
    pub const PROC_STAT_PATH: &'static str = "/proc/stat";

    /// Source reading the real `/proc/stat`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(Self::PROC_STAT_PATH)
    }

    /// Source reading a specific file (useful for testing).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, e: io::Error) -> CheckError {
        CheckError::source_unavailable_with(format!("Failed to read {}", self.path.display()), e)
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for ProcStatSource {
    fn read(&mut self) -> Result<CounterSnapshot, CheckError> {
        let content = fs::read_to_string(&self.path).map_err(|e| self.read_error(e))?;
        CounterSnapshot::parse(&content)
    }

    /// Verify the file exists, is readable, and holds a parsable cpu line.
    ///
    /// Permission problems surface as [`CheckError::PermissionDenied`].
    fn check_availability(&self) -> Result<(), CheckError> {
        if !self.path.exists() {
            return Err(CheckError::source_unavailable(format!(
                "{} does not exist (not a Linux system?)",
                self.path.display()
            )));
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => CounterSnapshot::parse(&content).map(|_| ()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(
                CheckError::permission_denied(self.path.display().to_string()),
            ),
            Err(e) => Err(self.read_error(e)),
        }
    }
}

/// Per-metric tick deltas between two snapshots.
///
/// Always contains `idle`, since overall usage is defined as non-idle time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deltas {
    per_metric: BTreeMap<MetricName, u64>,
    total: u64,
}

impl Deltas {
    /// Delta for `metric`, if it was sampled.
    #[must_use]
    pub fn get(&self, metric: MetricName) -> Option<u64> {
        self.per_metric.get(&metric).copied()
    }

    /// Sum of all sampled deltas.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Idle ticks elapsed between the snapshots.
    #[must_use]
    pub fn idle(&self) -> u64 {
        self.get(MetricName::Idle).unwrap_or(0)
    }

    /// Sampled metrics and their deltas in kernel order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricName, u64)> + '_ {
        self.per_metric.iter().map(|(metric, delta)| (*metric, *delta))
    }
}

/// Difference `metrics` (plus `idle`) between two snapshots.
///
/// # Errors
///
/// Returns [`CheckError::SourceUnavailable`] if any counter moved backwards,
/// which points at a wraparound or a sampling anomaly.
pub fn diff(
    before: &CounterSnapshot,
    after: &CounterSnapshot,
    metrics: &[MetricName],
) -> Result<Deltas, CheckError> {
    let mut per_metric = BTreeMap::new();
    let mut total: u64 = 0;

    let sampled = metrics
        .iter()
        .copied()
        .chain(std::iter::once(MetricName::Idle));

    for metric in sampled {
        if per_metric.contains_key(&metric) {
            continue;
        }

        let (old, new) = (before.get(metric), after.get(metric));
        let delta = new.checked_sub(old).ok_or_else(|| {
            CheckError::source_unavailable(format!(
                "CPU {} counter moved backwards ({} -> {})",
                metric, old, new
            ))
        })?;

        total = total
            .checked_add(delta)
            .ok_or_else(|| CheckError::source_unavailable("CPU tick total overflowed"))?;
        per_metric.insert(metric, delta);
    }

    Ok(Deltas { per_metric, total })
}

/// Integer usage percentages for one sampling interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageResult {
    per_metric: BTreeMap<MetricName, u8>,
    overall: u8,
}

impl UsageResult {
    /// Percentage of elapsed ticks spent in `metric`, if it was sampled.
    #[must_use]
    pub fn get(&self, metric: MetricName) -> Option<u8> {
        self.per_metric.get(&metric).copied()
    }

    /// Percentage of elapsed ticks not spent idle.
    #[must_use]
    pub const fn overall(&self) -> u8 {
        self.overall
    }

    /// Sampled metrics and their percentages in kernel order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricName, u8)> + '_ {
        self.per_metric.iter().map(|(metric, pct)| (*metric, *pct))
    }
}

/// `floor(100 * part / total)`; `part` never exceeds `total` here.
fn percent_of(part: u64, total: u64) -> u8 {
    let pct = u128::from(part) * 100 / u128::from(total);
    u8::try_from(pct).unwrap_or(100)
}

/// Convert deltas into truncated percentages of the elapsed ticks.
///
/// Truncation means the per-metric values can sum to slightly under 100.
///
/// # Errors
///
/// Returns [`CheckError::DivisionByZero`] when no ticks elapsed.
pub fn percentages(deltas: &Deltas) -> Result<UsageResult, CheckError> {
    let total = deltas.total();
    if total == 0 {
        return Err(CheckError::DivisionByZero);
    }

    let per_metric = deltas
        .iter()
        .map(|(metric, delta)| (metric, percent_of(delta, total)))
        .collect();
    let overall = percent_of(total - deltas.idle(), total);

    Ok(UsageResult { per_metric, overall })
}
