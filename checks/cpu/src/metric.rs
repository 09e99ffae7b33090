//! CPU time-accounting states as reported by the kernel.

use hostcheck_rs_core::CheckError;
use std::fmt;
use std::str::FromStr;

/// One CPU state accumulated in `/proc/stat`.
///
/// The declaration order matches the field order of the kernel's `cpu` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricName {
    /// Time spent in user mode (normal processes)
    User,
    /// Time spent in user mode with low priority (nice)
    Nice,
    /// Time spent in system mode (kernel)
    System,
    /// Time spent idle
    Idle,
    /// Time waiting for I/O to complete
    Iowait,
    /// Time servicing hardware interrupts
    Irq,
    /// Time servicing software interrupts
    Softirq,
    /// Time stolen by virtualization
    Steal,
    /// Time spent running a virtual CPU for guests
    Guest,
    /// Time spent running a niced guest
    GuestNice,
}

impl MetricName {
    /// Every metric in kernel field order.
    pub const ALL: [MetricName; 10] = [
        Self::User,
        Self::Nice,
        Self::System,
        Self::Idle,
        Self::Iowait,
        Self::Irq,
        Self::Softirq,
        Self::Steal,
        Self::Guest,
        Self::GuestNice,
    ];

    /// Lowercase kernel name of the metric.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Nice => "nice",
            Self::System => "system",
            Self::Idle => "idle",
            Self::Iowait => "iowait",
            Self::Irq => "irq",
            Self::Softirq => "softirq",
            Self::Steal => "steal",
            Self::Guest => "guest",
            Self::GuestNice => "guest_nice",
        }
    }

    /// Position of the metric's field on the `cpu` line.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name of the per-metric result event.
    #[must_use]
    pub fn check_name(self) -> String {
        format!("cpu-usage-{}", self.as_str())
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| CheckError::config_with_value("Unknown CPU metric", s))
    }
}
