//! Validated configuration for one CPU usage check run.

use crate::metric::MetricName;
use crate::threshold::ThresholdPair;
use hostcheck_rs_core::CheckError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Immutable, validated configuration of the CPU usage check.
///
/// # Examples
///
/// ```rust
/// use hostcheck_rs_cpu::{CpuCheckConfig, MetricName};
///
/// let config = CpuCheckConfig::builder()
///     .ignore([MetricName::Nice])
///     .thresholds(MetricName::Iowait, 20, 40)
///     .overall(70, 90)
///     .build()?;
///
/// assert!(!config.metrics().contains(&MetricName::Nice));
/// assert_eq!(config.overall().warn(), 70);
/// # Ok::<(), hostcheck_rs_core::CheckError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuCheckConfig {
    metrics: Vec<MetricName>,
    ignored: Vec<MetricName>,
    sleep: Duration,
    thresholds: BTreeMap<MetricName, ThresholdPair>,
    overall: ThresholdPair,
    handler: Option<String>,
}

impl CpuCheckConfig {
    /// Default sampling interval in seconds.
    pub const DEFAULT_SLEEP_SECS: u64 = 1;
    /// Default aggregate warning threshold.
    pub const DEFAULT_WARN: u8 = ThresholdPair::OVERALL_DEFAULT.warn();
    /// Default aggregate critical threshold.
    pub const DEFAULT_CRIT: u8 = ThresholdPair::OVERALL_DEFAULT.crit();

    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> CpuCheckConfigBuilder {
        CpuCheckConfigBuilder::default()
    }

    /// Metrics to classify, in kernel order, with ignored ones removed.
    #[must_use]
    pub fn metrics(&self) -> &[MetricName] {
        &self.metrics
    }

    /// Metrics excluded from monitoring.
    #[must_use]
    pub fn ignored(&self) -> &[MetricName] {
        &self.ignored
    }

    /// Time to wait between the two samples.
    #[must_use]
    pub const fn sleep(&self) -> Duration {
        self.sleep
    }

    /// Thresholds for `metric`, if any were configured.
    #[must_use]
    pub fn thresholds(&self, metric: MetricName) -> Option<ThresholdPair> {
        self.thresholds.get(&metric).copied()
    }

    /// Thresholds for overall usage.
    #[must_use]
    pub const fn overall(&self) -> ThresholdPair {
        self.overall
    }

    /// Handler name stamped on every event.
    #[must_use]
    pub fn handler(&self) -> Option<&str> {
        self.handler.as_deref()
    }
}

impl Default for CpuCheckConfig {
    fn default() -> Self {
        Self {
            metrics: MetricName::ALL.to_vec(),
            ignored: Vec::new(),
            sleep: Duration::from_secs(Self::DEFAULT_SLEEP_SECS),
            thresholds: BTreeMap::new(),
            overall: ThresholdPair::OVERALL_DEFAULT,
            handler: None,
        }
    }
}

/// Builder collecting raw settings; nothing is checked until [`build`].
///
/// [`build`]: CpuCheckConfigBuilder::build
#[derive(Debug, Clone)]
pub struct CpuCheckConfigBuilder {
    metrics: Vec<MetricName>,
    ignored: Vec<MetricName>,
    sleep_secs: u64,
    thresholds: BTreeMap<MetricName, (Option<u8>, Option<u8>)>,
    warn: u8,
    crit: u8,
    handler: Option<String>,
}

impl Default for CpuCheckConfigBuilder {
    fn default() -> Self {
        Self {
            metrics: MetricName::ALL.to_vec(),
            ignored: Vec::new(),
            sleep_secs: CpuCheckConfig::DEFAULT_SLEEP_SECS,
            thresholds: BTreeMap::new(),
            warn: CpuCheckConfig::DEFAULT_WARN,
            crit: CpuCheckConfig::DEFAULT_CRIT,
            handler: None,
        }
    }
}

impl CpuCheckConfigBuilder {
    /// Metrics to monitor (default: all).
    #[must_use]
    pub fn metrics(mut self, metrics: impl IntoIterator<Item = MetricName>) -> Self {
        self.metrics = metrics.into_iter().collect();
        self
    }

    /// Metrics to exclude; each is reported OK without being measured.
    #[must_use]
    pub fn ignore(mut self, metrics: impl IntoIterator<Item = MetricName>) -> Self {
        for metric in metrics {
            if !self.ignored.contains(&metric) {
                self.ignored.push(metric);
            }
        }
        self
    }

    /// Seconds between the two samples; 0 samples back to back.
    #[must_use]
    pub fn sleep_secs(mut self, secs: u64) -> Self {
        self.sleep_secs = secs;
        self
    }

    /// Warning level for one metric.
    #[must_use]
    pub fn warn(mut self, metric: MetricName, level: u8) -> Self {
        self.thresholds.entry(metric).or_default().0 = Some(level);
        self
    }

    /// Critical level for one metric.
    #[must_use]
    pub fn crit(mut self, metric: MetricName, level: u8) -> Self {
        self.thresholds.entry(metric).or_default().1 = Some(level);
        self
    }

    /// Both levels for one metric.
    #[must_use]
    pub fn thresholds(self, metric: MetricName, warn: u8, crit: u8) -> Self {
        self.warn(metric, warn).crit(metric, crit)
    }

    /// Levels for overall usage (default 80/90).
    #[must_use]
    pub fn overall(mut self, warn: u8, crit: u8) -> Self {
        self.warn = warn;
        self.crit = crit;
        self
    }

    /// Handler name to stamp on events.
    #[must_use]
    pub fn handler(mut self, handler: Option<impl Into<String>>) -> Self {
        self.handler = handler.map(Into::into);
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ConfigInvalid`] if the aggregate pair or any
    /// per-metric pair is out of order, or a per-metric pair is incomplete.
    pub fn build(self) -> Result<CpuCheckConfig, CheckError> {
        let overall = ThresholdPair::new(self.warn, self.crit).map_err(|_| {
            CheckError::config_with_value(
                "Warning CPU usage threshold must be lower than the critical threshold",
                format!("warn={} crit={}", self.warn, self.crit),
            )
        })?;

        let mut thresholds = BTreeMap::new();
        for (metric, (warn, crit)) in self.thresholds {
            let label = format!("CPU {}", metric);
            if let Some(pair) = ThresholdPair::from_options(&label, warn, crit)? {
                thresholds.insert(metric, pair);
            }
        }

        let metrics = MetricName::ALL
            .into_iter()
            .filter(|m| self.metrics.contains(m) && !self.ignored.contains(m))
            .collect();

        Ok(CpuCheckConfig {
            metrics,
            ignored: self.ignored,
            sleep: Duration::from_secs(self.sleep_secs),
            thresholds,
            overall,
            handler: self.handler,
        })
    }
}
