//! CPU usage check for hostcheck-rs.
//!
//! This crate samples the kernel's CPU accounting counters in `/proc/stat`
//! twice, turns the difference into per-state usage percentages, and
//! classifies each state and the overall non-idle usage against
//! warning/critical thresholds.
//!
//! # Examples
//!
//! ```rust
//! use hostcheck_rs_cpu::{diff, percentages, CounterSnapshot};
//!
//! let before = CounterSnapshot::parse_line("cpu  100 0 50 800 0 0 0 0 0 0")?;
//! let after = CounterSnapshot::parse_line("cpu  120 0 60 820 0 0 0 0 0 0")?;
//!
//! let usage = percentages(&diff(&before, &after, &hostcheck_rs_cpu::MetricName::ALL)?)?;
//! assert_eq!(usage.overall(), 60);
//! # Ok::<(), hostcheck_rs_core::CheckError>(())
//! ```

pub mod check;
pub mod config;
pub mod metric;
pub mod stats;
pub mod threshold;

pub use check::{CpuReport, CpuUsageCheck};
pub use config::{CpuCheckConfig, CpuCheckConfigBuilder};
pub use metric::MetricName;
pub use stats::{
    diff, percentages, CounterSnapshot, CounterSource, Deltas, ProcStatSource, UsageResult,
};
pub use threshold::{classify, classify_overall, Classification, ThresholdPair};
