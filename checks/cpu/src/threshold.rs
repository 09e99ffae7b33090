//! Threshold evaluation for CPU usage percentages.

use crate::metric::MetricName;
use hostcheck_rs_core::{CheckError, Status};

/// A validated warning/critical threshold pair, in percent.
///
/// Construction guarantees `warn < crit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPair {
    warn: u8,
    crit: u8,
}

impl ThresholdPair {
    /// Default aggregate levels: 80% warning, 90% critical.
    pub const OVERALL_DEFAULT: Self = Self { warn: 80, crit: 90 };

    /// Create a threshold pair.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ConfigInvalid`] unless `warn < crit`.
    pub fn new(warn: u8, crit: u8) -> Result<Self, CheckError> {
        if warn >= crit {
            return Err(CheckError::config_with_value(
                "Warning threshold must be lower than the critical threshold",
                format!("warn={} crit={}", warn, crit),
            ));
        }
        Ok(Self { warn, crit })
    }

    /// Build an optional pair from separately supplied flags.
    ///
    /// `label` names the thresholds in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ConfigInvalid`] if only one of the two is given,
    /// or if the pair is out of order.
    pub fn from_options(
        label: &str,
        warn: Option<u8>,
        crit: Option<u8>,
    ) -> Result<Option<Self>, CheckError> {
        match (warn, crit) {
            (None, None) => Ok(None),
            (Some(warn), Some(crit)) => Self::new(warn, crit).map(Some).map_err(|_| {
                CheckError::config_with_value(
                    format!(
                        "Warning {} threshold must be lower than the critical threshold",
                        label
                    ),
                    format!("warn={} crit={}", warn, crit),
                )
            }),
            _ => Err(CheckError::config(format!(
                "Must specify both warning and critical thresholds for {}",
                label
            ))),
        }
    }

    /// Warning level in percent.
    #[must_use]
    pub const fn warn(&self) -> u8 {
        self.warn
    }

    /// Critical level in percent.
    #[must_use]
    pub const fn crit(&self) -> u8 {
        self.crit
    }

    /// Severity of `value`; reaching a level counts as crossing it.
    #[must_use]
    pub const fn level(&self, value: u8) -> Status {
        if value >= self.crit {
            Status::Critical
        } else if value >= self.warn {
            Status::Warning
        } else {
            Status::Ok
        }
    }
}

/// A severity together with its rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Severity of the result
    pub status: Status,
    /// Message without the level prefix
    pub message: String,
}

impl Classification {
    fn new(status: Status, message: String) -> Self {
        Self { status, message }
    }

    /// A metric deliberately excluded from monitoring.
    #[must_use]
    pub fn ignored(metric: MetricName) -> Self {
        Self::new(Status::Ok, format!("CPU {} time not monitored", metric))
    }

    /// A metric that could not be measured because no ticks elapsed.
    #[must_use]
    pub fn not_sampled(metric: MetricName) -> Self {
        Self::new(
            Status::Unknown,
            format!("CPU {} not monitored - no CPU ticks elapsed while sampling", metric),
        )
    }

    /// Overall usage that could not be measured because no ticks elapsed.
    #[must_use]
    pub fn overall_not_sampled() -> Self {
        Self::new(
            Status::Unknown,
            "CPU usage unknown - no CPU ticks elapsed while sampling".to_owned(),
        )
    }
}

/// Classify one metric's usage against its optional thresholds.
///
/// A metric without thresholds is UNKNOWN.
#[must_use]
pub fn classify(metric: MetricName, value: u8, pair: Option<ThresholdPair>) -> Classification {
    let Some(pair) = pair else {
        return Classification::new(Status::Unknown, format!("CPU {} not monitored", metric));
    };

    let message = match pair.level(value) {
        Status::Critical => format!(
            "CPU {} time is too high - Current: {}% (>= {}%)",
            metric,
            value,
            pair.crit()
        ),
        Status::Warning => format!(
            "High CPU {} time - Current: {}% (>= {}%)",
            metric,
            value,
            pair.warn()
        ),
        _ => format!(
            "CPU {} time is normal - Current: {}% (<= {}%)",
            metric,
            value,
            pair.warn()
        ),
    };

    Classification::new(pair.level(value), message)
}

/// Classify overall (non-idle) usage against the aggregate thresholds.
#[must_use]
pub fn classify_overall(value: u8, pair: ThresholdPair) -> Classification {
    let status = pair.level(value);
    let message = match status {
        Status::Critical => format!(
            "CPU usage is too high - Current: {}% (>= {}%)",
            value,
            pair.crit()
        ),
        Status::Warning => format!("High CPU usage - Current: {}% (>= {}%)", value, pair.warn()),
        _ => format!("CPU usage is normal - Current: {}% (<= {}%)", value, pair.warn()),
    };

    Classification::new(status, message)
}
