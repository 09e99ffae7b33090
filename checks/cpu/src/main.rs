//! hostcheck-rs-cpu: CPU usage check binary.
//!
//! Samples `/proc/stat` twice, sends one result event per CPU state to the
//! local event collector, prints the overall status line, and exits with the
//! check-plugin status code (0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN).

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use hostcheck_rs_core::{
    Check, CheckError, CheckEvent, CheckOutput, EventSink, GlobalConfig, Status, UdpEventSink,
};
use hostcheck_rs_cpu::{CpuCheckConfig, CpuUsageCheck, MetricName, ProcStatSource};
use std::path::PathBuf;
use std::process;

/// Command-line arguments for the CPU usage check.
#[derive(Parser)]
#[command(name = "hostcheck-rs-cpu")]
#[command(about = "CPU usage check for hostcheck-rs")]
#[command(version)]
#[command(author)]
struct Args {
    /// Comma separated list of metrics to monitor (default: all)
    #[arg(short, long, value_delimiter = ',')]
    metric: Vec<MetricName>,

    /// Comma separated list of metrics to ignore
    #[arg(short, long, value_delimiter = ',')]
    ignore_metric: Vec<MetricName>,

    #[command(flatten)]
    thresholds: MetricThresholds,

    /// Sleep N seconds between the two samples
    #[arg(short, long, default_value_t = CpuCheckConfig::DEFAULT_SLEEP_SECS)]
    sleep: u64,

    /// Warn if overall CPU usage reaches USAGE percent
    #[arg(
        short,
        long,
        default_value_t = CpuCheckConfig::DEFAULT_WARN,
        value_parser = validate_percentage
    )]
    warn: u8,

    /// Critical if overall CPU usage reaches USAGE percent (must be > warn)
    #[arg(
        short,
        long = "critical",
        default_value_t = CpuCheckConfig::DEFAULT_CRIT,
        value_parser = validate_percentage
    )]
    crit: u8,

    /// Handler name placed in every event (overrides the config file)
    #[arg(long)]
    handler: Option<String>,

    /// Verify /proc/stat is readable and parsable, then exit
    #[arg(long)]
    check: bool,

    /// Generate example config file and exit
    #[arg(long)]
    generate_config: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Per-metric warning and critical levels.
#[derive(clap::Args)]
struct MetricThresholds {
    /// Warn if CPU user time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_user: Option<u8>,
    /// Critical if CPU user time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_user: Option<u8>,

    /// Warn if CPU nice time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_nice: Option<u8>,
    /// Critical if CPU nice time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_nice: Option<u8>,

    /// Warn if CPU system time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_system: Option<u8>,
    /// Critical if CPU system time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_system: Option<u8>,

    /// Warn if CPU idle time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_idle: Option<u8>,
    /// Critical if CPU idle time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_idle: Option<u8>,

    /// Warn if CPU iowait time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_iowait: Option<u8>,
    /// Critical if CPU iowait time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_iowait: Option<u8>,

    /// Warn if CPU irq time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_irq: Option<u8>,
    /// Critical if CPU irq time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_irq: Option<u8>,

    /// Warn if CPU softirq time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_softirq: Option<u8>,
    /// Critical if CPU softirq time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_softirq: Option<u8>,

    /// Warn if CPU steal time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_steal: Option<u8>,
    /// Critical if CPU steal time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_steal: Option<u8>,

    /// Warn if CPU guest time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    warn_guest: Option<u8>,
    /// Critical if CPU guest time reaches USAGE percent
    #[arg(long, value_parser = validate_percentage)]
    crit_guest: Option<u8>,

    /// Warn if CPU guest_nice time reaches USAGE percent
    #[arg(long, alias = "warn-guest_nice", value_parser = validate_percentage)]
    warn_guest_nice: Option<u8>,
    /// Critical if CPU guest_nice time reaches USAGE percent
    #[arg(long, alias = "crit-guest_nice", value_parser = validate_percentage)]
    crit_guest_nice: Option<u8>,
}

impl MetricThresholds {
    /// `(metric, warn, crit)` for every metric in kernel order.
    fn pairs(&self) -> [(MetricName, Option<u8>, Option<u8>); 10] {
        use MetricName::*;

        [
            (User, self.warn_user, self.crit_user),
            (Nice, self.warn_nice, self.crit_nice),
            (System, self.warn_system, self.crit_system),
            (Idle, self.warn_idle, self.crit_idle),
            (Iowait, self.warn_iowait, self.crit_iowait),
            (Irq, self.warn_irq, self.crit_irq),
            (Softirq, self.warn_softirq, self.crit_softirq),
            (Steal, self.warn_steal, self.crit_steal),
            (Guest, self.warn_guest, self.crit_guest),
            (GuestNice, self.warn_guest_nice, self.crit_guest_nice),
        ]
    }
}

/// Validate that the percentage is between 0 and 100.
fn validate_percentage(s: &str) -> Result<u8, String> {
    let percentage = s
        .parse::<u8>()
        .map_err(|_| "Percentage must be a number between 0-100".to_owned())?;

    if percentage > 100 {
        return Err("Percentage must be between 0-100".to_owned());
    }

    Ok(percentage)
}

/// Turn parsed arguments into a validated check configuration.
fn build_config(args: &Args, global: &GlobalConfig) -> Result<CpuCheckConfig, CheckError> {
    let mut builder = CpuCheckConfig::builder()
        .ignore(args.ignore_metric.iter().copied())
        .sleep_secs(args.sleep)
        .overall(args.warn, args.crit)
        .handler(args.handler.clone().or_else(|| global.handler.clone()));

    if !args.metric.is_empty() {
        builder = builder.metrics(args.metric.iter().copied());
    }

    for (metric, warn, crit) in args.thresholds.pairs() {
        if let Some(level) = warn {
            builder = builder.warn(metric, level);
        }
        if let Some(level) = crit {
            builder = builder.crit(metric, level);
        }
    }

    builder.build()
}

/// Outcome for an argument error; `None` for help and version requests.
fn usage_error(e: &clap::Error) -> Option<CheckOutput> {
    match e.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => None,
        _ => {
            let rendered = e.to_string();
            let message = rendered.lines().next().unwrap_or_default();
            Some(CheckOutput::unknown(message.trim_start_matches("error: ")))
        }
    }
}

/// Write the example global config and return where it went.
fn generate_config() -> anyhow::Result<PathBuf> {
    let config_path =
        GlobalConfig::default_config_path().context("Could not determine config directory")?;
    GlobalConfig::save_example_config_to_file(&config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}

/// Sink used when no local socket could be bound.
struct DiscardSink;

impl EventSink for DiscardSink {
    fn emit(&self, event: &CheckEvent) -> Result<(), CheckError> {
        log::debug!("discarding event {}", event.name);
        Ok(())
    }
}

/// Print the status line and exit with its code.
fn finish(output: &CheckOutput) -> ! {
    println!("{}", output.render(CpuUsageCheck::<ProcStatSource>::NAME));
    process::exit(output.status.exit_code())
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Main entry point for the CPU usage check.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match usage_error(&e) {
            Some(output) => finish(&output),
            None => e.exit(),
        },
    };
    init_logging(args.verbose);

    if args.generate_config {
        match generate_config() {
            Ok(path) => {
                println!("Generated example config at: {}", path.display());
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(Status::Unknown.exit_code());
            }
        }
    }

    let global_config = GlobalConfig::load().unwrap_or_else(|e| {
        log::warn!("Ignoring global config: {}", e);
        GlobalConfig::default()
    });

    let config = match build_config(&args, &global_config) {
        Ok(config) => config,
        Err(e) => finish(&CheckOutput::unknown(e.to_string())),
    };
    let collector = match global_config.event_socket_addr() {
        Ok(addr) => addr,
        Err(e) => finish(&CheckOutput::unknown(e.to_string())),
    };

    let source = ProcStatSource::with_path(&global_config.proc_stat_path);
    let mut cpu_check = CpuUsageCheck::with_source(config, source);

    if args.check {
        match cpu_check.check_availability() {
            Ok(()) => {
                println!("CPU counters are available");
                return Ok(());
            }
            Err(e) => {
                eprintln!("CPU counters are not available: {}", e);
                process::exit(1);
            }
        }
    }

    let result = match UdpEventSink::new(collector) {
        Ok(sink) => cpu_check.run(&sink).await,
        Err(e) => {
            log::warn!("Events will be discarded: {}", e);
            cpu_check.run(&DiscardSink).await
        }
    };

    match result {
        Ok(output) => finish(&output),
        Err(e) => finish(&CheckOutput::unknown(e.to_string())),
    }
}
