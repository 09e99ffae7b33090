//! The CPU usage check: two samples, one classification pass, one outcome.

use crate::config::CpuCheckConfig;
use crate::metric::MetricName;
use crate::stats::{diff, percentages, CounterSource, Deltas, ProcStatSource};
use crate::threshold::{classify, classify_overall, Classification};
use hostcheck_rs_core::{Check, CheckError, CheckEvent, CheckOutput, EventSink};

/// Classifications produced from one pair of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuReport {
    /// One entry per monitored metric, in kernel order
    pub metrics: Vec<(MetricName, Classification)>,
    /// Overall (non-idle) usage
    pub overall: Classification,
}

/// CPU usage check sampling a [`CounterSource`] twice per run.
///
/// # Examples
///
/// ```rust,no_run
/// use hostcheck_rs_core::{Check, UdpEventSink};
/// use hostcheck_rs_cpu::{CpuCheckConfig, CpuUsageCheck};
///
/// # async fn demo() -> Result<(), hostcheck_rs_core::CheckError> {
/// let config = CpuCheckConfig::builder().overall(70, 90).build()?;
/// let sink = UdpEventSink::new(UdpEventSink::DEFAULT_ADDRESS.parse().unwrap())?;
///
/// let mut check = CpuUsageCheck::new(config);
/// let output = check.run(&sink).await?;
/// println!("{}", output.render(check.name()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CpuUsageCheck<S = ProcStatSource> {
    name: String,
    config: CpuCheckConfig,
    source: S,
}

impl CpuUsageCheck<ProcStatSource> {
    /// Create a check reading the real `/proc/stat`.
    #[must_use]
    pub fn new(config: CpuCheckConfig) -> Self {
        Self::with_source(config, ProcStatSource::new())
    }
}

impl<S: CounterSource> CpuUsageCheck<S> {
    /// Name used in the status line.
    pub const NAME: &'static str = "cpu-usage";

    /// Create a check reading counters from `source`.
    pub fn with_source(config: CpuCheckConfig, source: S) -> Self {
        Self {
            name: Self::NAME.to_owned(),
            config,
            source,
        }
    }

    /// The configuration this check runs with.
    #[must_use]
    pub fn config(&self) -> &CpuCheckConfig {
        &self.config
    }

    /// Take both samples and difference them.
    async fn sample(&mut self) -> Result<Deltas, CheckError> {
        let before = self.source.read()?;
        log::debug!("first sample: {:?}", before);

        let sleep = self.config.sleep();
        if !sleep.is_zero() {
            log::debug!("sleeping {:?} between samples", sleep);
            tokio::time::sleep(sleep).await;
        }

        let after = self.source.read()?;
        log::debug!("second sample: {:?}", after);

        diff(&before, &after, self.config.metrics())
    }

    /// Classify every monitored metric and the overall usage.
    ///
    /// When no ticks elapsed every metric and the overall result are UNKNOWN.
    ///
    /// # Errors
    ///
    /// Only fatal errors propagate; see [`CheckError::is_fatal`].
    pub fn evaluate(&self, deltas: &Deltas) -> Result<CpuReport, CheckError> {
        let usage = match percentages(deltas) {
            Ok(usage) => usage,
            Err(e) if !e.is_fatal() => {
                log::info!("no CPU ticks elapsed between samples");
                return Ok(CpuReport {
                    metrics: self
                        .config
                        .metrics()
                        .iter()
                        .map(|&metric| (metric, Classification::not_sampled(metric)))
                        .collect(),
                    overall: Classification::overall_not_sampled(),
                });
            }
            Err(e) => return Err(e),
        };
        log::debug!("usage: {:?}", usage);

        let metrics = self
            .config
            .metrics()
            .iter()
            .map(|&metric| {
                let classification = match usage.get(metric) {
                    Some(value) => classify(metric, value, self.config.thresholds(metric)),
                    None => Classification::not_sampled(metric),
                };
                (metric, classification)
            })
            .collect();

        Ok(CpuReport {
            metrics,
            overall: classify_overall(usage.overall(), self.config.overall()),
        })
    }

    /// Send one event; a failed delivery is logged and dropped.
    fn emit(&self, sink: &dyn EventSink, metric: MetricName, classification: &Classification) {
        let event = CheckEvent::new(
            metric.check_name(),
            classification.status,
            &classification.message,
            self.config.handler(),
        );

        if let Err(e) = sink.emit(&event) {
            log::warn!("dropped event {}: {}", event.name, e);
        }
    }
}

impl<S: CounterSource> Check for CpuUsageCheck<S> {
    type Error = CheckError;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, sink: &dyn EventSink) -> Result<CheckOutput, Self::Error> {
        let deltas = self.sample().await?;
        let report = self.evaluate(&deltas)?;

        for (metric, classification) in &report.metrics {
            self.emit(sink, *metric, classification);
        }

        for &metric in self.config.ignored() {
            self.emit(sink, metric, &Classification::ignored(metric));
        }

        log::info!("{}: {}", report.overall.status, report.overall.message);
        Ok(CheckOutput::new(report.overall.status, report.overall.message))
    }

    fn check_availability(&self) -> Result<(), Self::Error> {
        self.source.check_availability()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CounterSnapshot;
    use hostcheck_rs_core::Status;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use MetricName::*;

    /// Hands out prepared snapshots in order.
    struct ScriptedSource(VecDeque<Result<CounterSnapshot, CheckError>>);

    impl ScriptedSource {
        fn pair(before: &[(MetricName, u64)], after: &[(MetricName, u64)]) -> Self {
            Self(VecDeque::from([
                Ok(CounterSnapshot::from_pairs(before.iter().copied())),
                Ok(CounterSnapshot::from_pairs(after.iter().copied())),
            ]))
        }
    }

    impl CounterSource for ScriptedSource {
        fn read(&mut self) -> Result<CounterSnapshot, CheckError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(CheckError::source_unavailable("script exhausted")))
        }
    }

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<CheckEvent>>);

    impl RecordingSink {
        fn events(&self) -> Vec<CheckEvent> {
            self.0.borrow().clone()
        }

        fn event(&self, name: &str) -> CheckEvent {
            self.events()
                .into_iter()
                .find(|e| e.name == name)
                .unwrap_or_else(|| panic!("no event named {name}"))
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &CheckEvent) -> Result<(), CheckError> {
            self.0.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: &CheckEvent) -> Result<(), CheckError> {
            Err(CheckError::Io(std::io::Error::other("collector down")))
        }
    }

    const BEFORE: &[(MetricName, u64)] = &[(User, 100), (System, 50), (Idle, 800)];
    const AFTER: &[(MetricName, u64)] = &[(User, 120), (System, 60), (Idle, 820)];

    fn cpu_check(config: CpuCheckConfig, source: ScriptedSource) -> CpuUsageCheck<ScriptedSource> {
        CpuUsageCheck::with_source(config, source)
    }

    fn quick() -> crate::config::CpuCheckConfigBuilder {
        CpuCheckConfig::builder().sleep_secs(0)
    }

    #[tokio::test]
    async fn test_default_thresholds_scenario() {
        let sink = RecordingSink::default();
        let mut check = cpu_check(quick().build().unwrap(), ScriptedSource::pair(BEFORE, AFTER));

        let output = check.run(&sink).await.unwrap();
        assert_eq!(output.status, Status::Ok);
        assert_eq!(output.message, "CPU usage is normal - Current: 60% (<= 80%)");

        let events = sink.events();
        assert_eq!(events.len(), 10);
        assert!(events.iter().all(|e| e.status == Status::Unknown.code()));
        assert_eq!(sink.event("cpu-usage-user").output, "UNKNOWN: CPU user not monitored");
    }

    #[tokio::test]
    async fn test_tight_overall_thresholds() {
        let sink = RecordingSink::default();
        let config = quick().overall(40, 50).build().unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, AFTER));

        let output = check.run(&sink).await.unwrap();
        assert_eq!(output.status, Status::Critical);
        assert_eq!(output.message, "CPU usage is too high - Current: 60% (>= 50%)");

        let config = quick().overall(60, 70).build().unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, AFTER));
        assert_eq!(check.run(&sink).await.unwrap().status, Status::Warning);
    }

    #[tokio::test]
    async fn test_per_metric_thresholds() {
        let sink = RecordingSink::default();
        let config = quick()
            .thresholds(User, 30, 40)
            .thresholds(System, 20, 30)
            .thresholds(Idle, 50, 60)
            .handler(Some("pager"))
            .build()
            .unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, AFTER));
        check.run(&sink).await.unwrap();

        let user = sink.event("cpu-usage-user");
        assert_eq!(user.status, 2);
        assert_eq!(user.output, "CRITICAL: CPU user time is too high - Current: 40% (>= 40%)");
        assert_eq!(user.handler.as_deref(), Some("pager"));

        let system = sink.event("cpu-usage-system");
        assert_eq!(system.status, 1);
        assert_eq!(system.output, "WARNING: High CPU system time - Current: 20% (>= 20%)");

        let idle = sink.event("cpu-usage-idle");
        assert_eq!(idle.status, 0);
        assert_eq!(idle.output, "OK: CPU idle time is normal - Current: 40% (<= 50%)");
    }

    #[tokio::test]
    async fn test_ignored_metrics_report_ok() {
        let sink = RecordingSink::default();
        let config = quick()
            .ignore([Nice, Iowait])
            .thresholds(Nice, 1, 2)
            .thresholds(Iowait, 1, 2)
            .build()
            .unwrap();
        let busy_nice = [(User, 100), (System, 50), (Nice, 1_000), (Iowait, 1_000), (Idle, 900)];
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, &busy_nice));
        check.run(&sink).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 10);
        for name in ["cpu-usage-nice", "cpu-usage-iowait"] {
            let matching: Vec<_> = events.iter().filter(|e| e.name == name).collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].status, 0);
        }
        assert_eq!(sink.event("cpu-usage-nice").output, "OK: CPU nice time not monitored");
        assert_eq!(sink.event("cpu-usage-iowait").output, "OK: CPU iowait time not monitored");
    }

    #[tokio::test]
    async fn test_ignored_idle_still_drives_overall() {
        let sink = RecordingSink::default();
        let config = quick().ignore([Idle]).build().unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, AFTER));

        let output = check.run(&sink).await.unwrap();
        assert_eq!(output.message, "CPU usage is normal - Current: 60% (<= 80%)");
        assert_eq!(sink.event("cpu-usage-idle").output, "OK: CPU idle time not monitored");
    }

    #[tokio::test]
    async fn test_zero_ticks_reports_unknown() {
        let sink = RecordingSink::default();
        let config = quick().thresholds(User, 10, 20).build().unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, BEFORE));

        let output = check.run(&sink).await.unwrap();
        assert_eq!(output.status, Status::Unknown);

        let events = sink.events();
        assert_eq!(events.len(), 10);
        assert!(events.iter().all(|e| e.status == Status::Unknown.code()));
    }

    #[tokio::test]
    async fn test_backwards_counter_aborts_without_events() {
        let sink = RecordingSink::default();
        let mut check = cpu_check(quick().build().unwrap(), ScriptedSource::pair(AFTER, BEFORE));

        let err = check.run(&sink).await.unwrap_err();
        assert!(matches!(err, CheckError::SourceUnavailable { .. }));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_source_aborts() {
        let sink = RecordingSink::default();
        let source = ScriptedSource(VecDeque::from([Err(CheckError::source_unavailable("gone"))]));
        let mut check = cpu_check(quick().build().unwrap(), source);

        assert!(check.run(&sink).await.is_err());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_change_outcome() {
        let config = quick().overall(40, 50).build().unwrap();
        let mut check = cpu_check(config, ScriptedSource::pair(BEFORE, AFTER));

        let output = check.run(&FailingSink).await.unwrap();
        assert_eq!(output.status, Status::Critical);
    }

    #[test]
    fn test_evaluate_only_requested_metrics() {
        let config = quick().metrics([User, Steal]).build().unwrap();
        let check = cpu_check(config, ScriptedSource(VecDeque::new()));

        let before = CounterSnapshot::from_pairs(BEFORE.iter().copied());
        let after = CounterSnapshot::from_pairs(AFTER.iter().copied());
        let deltas = diff(&before, &after, check.config().metrics()).unwrap();
        let report = check.evaluate(&deltas).unwrap();

        let names: Vec<_> = report.metrics.iter().map(|(m, _)| *m).collect();
        assert_eq!(names, vec![User, Steal]);
        // idle is sampled for overall usage: 20 user + 20 idle ticks
        assert_eq!(report.overall.message, "CPU usage is normal - Current: 50% (<= 80%)");
    }

    #[test]
    fn test_name() {
        let check = cpu_check(CpuCheckConfig::default(), ScriptedSource(VecDeque::new()));
        assert_eq!(check.name(), "cpu-usage");
    }
}
