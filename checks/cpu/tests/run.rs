use hostcheck_rs_core::{Check, CheckError, CheckEvent, Status, UdpEventSink};
use hostcheck_rs_cpu::{
    CounterSnapshot, CounterSource, CpuCheckConfig, CpuUsageCheck, MetricName, ProcStatSource,
};
use std::io::Write;
use std::net::UdpSocket;
use std::time::Duration;

struct TwoSamples(Vec<CounterSnapshot>);

impl CounterSource for TwoSamples {
    fn read(&mut self) -> Result<CounterSnapshot, CheckError> {
        if self.0.is_empty() {
            return Err(CheckError::source_unavailable("no more samples"));
        }
        Ok(self.0.remove(0))
    }
}

fn collector() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    socket
}

fn receive_all(socket: &UdpSocket, count: usize) -> Vec<CheckEvent> {
    let mut buf = [0u8; 2048];
    (0..count)
        .map(|_| {
            let (len, _) = socket.recv_from(&mut buf).unwrap();
            let line = std::str::from_utf8(&buf[..len]).unwrap();
            assert!(line.ends_with('\n'));
            serde_json::from_str(line.trim_end()).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn events_reach_the_collector() {
    let collector = collector();
    let sink = UdpEventSink::new(collector.local_addr().unwrap()).unwrap();

    let before = CounterSnapshot::parse_line("cpu  100 0 50 800 0 0 0 0 0 0").unwrap();
    let after = CounterSnapshot::parse_line("cpu  120 0 60 820 0 0 0 0 0 0").unwrap();
    let config = CpuCheckConfig::builder()
        .sleep_secs(0)
        .metrics([MetricName::User, MetricName::System])
        .ignore([MetricName::Steal])
        .thresholds(MetricName::User, 30, 45)
        .handler(Some("ops"))
        .build()
        .unwrap();

    let mut check = CpuUsageCheck::with_source(config, TwoSamples(vec![before, after]));
    let output = check.run(&sink).await.unwrap();

    assert_eq!(output.status, Status::Ok);
    assert_eq!(
        output.render(check.name()),
        "cpu-usage OK: CPU usage is normal - Current: 60% (<= 80%)"
    );

    let events = receive_all(&collector, 3);
    assert_eq!(events[0].name, "cpu-usage-user");
    assert_eq!(events[0].status, 1);
    assert_eq!(events[0].output, "WARNING: High CPU user time - Current: 40% (>= 30%)");
    assert_eq!(events[0].handler.as_deref(), Some("ops"));

    assert_eq!(events[1].name, "cpu-usage-system");
    assert_eq!(events[1].status, 3);

    assert_eq!(events[2].name, "cpu-usage-steal");
    assert_eq!(events[2].output, "OK: CPU steal time not monitored");
}

#[tokio::test]
async fn unchanged_proc_stat_reports_unknown() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cpu  4705 356 584 3699 23 23 0 0 0").unwrap();
    writeln!(file, "cpu0 4705 356 584 3699 23 23 0 0 0").unwrap();
    writeln!(file, "intr 1462898").unwrap();

    let collector = collector();
    let sink = UdpEventSink::new(collector.local_addr().unwrap()).unwrap();
    let config = CpuCheckConfig::builder()
        .sleep_secs(0)
        .metrics([MetricName::Idle])
        .build()
        .unwrap();

    let mut check = CpuUsageCheck::with_source(config, ProcStatSource::with_path(file.path()));
    assert!(check.check_availability().is_ok());

    let output = check.run(&sink).await.unwrap();
    assert_eq!(output.status, Status::Unknown);
    assert_eq!(output.status.exit_code(), 3);

    let events = receive_all(&collector, 1);
    assert_eq!(events[0].name, "cpu-usage-idle");
    assert_eq!(events[0].status, 3);
}

#[tokio::test]
async fn malformed_proc_stat_fails_the_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cpu  1 2 3").unwrap();

    let sink = UdpEventSink::new(collector().local_addr().unwrap()).unwrap();
    let mut check = CpuUsageCheck::with_source(
        CpuCheckConfig::builder().sleep_secs(0).build().unwrap(),
        ProcStatSource::with_path(file.path()),
    );

    assert!(check.check_availability().is_err());
    let err = check.run(&sink).await.unwrap_err();
    assert!(matches!(err, CheckError::SourceUnavailable { .. }));
}

#[test]
fn invalid_thresholds_rejected_before_sampling() {
    let err = CpuCheckConfig::builder()
        .thresholds(MetricName::Softirq, 90, 80)
        .build()
        .unwrap_err();
    assert!(matches!(err, CheckError::ConfigInvalid { .. }));
}
