use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use smu_cycler::model::DEFAULT_BASE_URL;
use smu_cycler::orchestrator::{format_progress, process_run_completion, PollOutcome};
use smu_cycler::steps::{build_formation_cycle, build_standard_cycle, FormationCycle, StandardCycle};
use smu_cycler::{ClientConfig, RunStatus, SmuClient, StepEntry, TestDefinition, TestOrchestrator};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "smu-cycler",
    version,
    about = "Script, start and monitor battery cycling tests on a minismu server"
)]
pub struct Cli {
    /// Base URL of the instrument server
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout
    #[arg(long, global = true, default_value = "10s")]
    pub timeout: humantime::Duration,

    /// Print server responses as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Check that the server answers
    Check,
    /// Print a step list as JSON without contacting the server
    Steps(StepSource),
    /// Ask the server to validate a step list
    Validate(StepSource),
    /// Validate and start a cycling test
    Start(StartArgs),
    /// Show the current run status
    Status,
    /// Stop the running test
    Stop,
    /// Pause the running test
    Pause,
    /// Resume a paused test
    Resume,
    /// Poll status until the run finishes (Ctrl-C stops watching, not the run)
    Watch(WatchArgs),
    /// Fetch server-side analysis payloads
    #[command(subcommand)]
    Telemetry(TelemetryCommand),
    /// Take a reading from the SMU
    Measure {
        #[arg(long, default_value_t = 1)]
        channel: u32,
        #[arg(value_enum, default_value_t = Quantity::Both)]
        quantity: Quantity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Standard,
    Formation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Quantity {
    Voltage,
    Current,
    Both,
}

#[derive(Debug, Args, Clone)]
pub struct StepSource {
    /// JSON file holding the step list, markers included
    #[arg(long)]
    pub steps_file: Option<PathBuf>,

    /// Built-in step pattern used when no file is given
    #[arg(long, value_enum, default_value_t = Preset::Standard)]
    pub preset: Preset,

    /// CC charge current (A)
    #[arg(long, default_value_t = 0.01)]
    pub charge_current: f64,

    /// CC discharge current (A, negative)
    #[arg(long, default_value_t = -0.01, allow_hyphen_values = true)]
    pub discharge_current: f64,

    /// Charge voltage limit (V)
    #[arg(long, default_value_t = 4.2)]
    pub charge_voltage: f64,

    /// Discharge voltage limit (V)
    #[arg(long, default_value_t = 3.0)]
    pub discharge_voltage: f64,

    /// Current at which CV holds end (A)
    #[arg(long, default_value_t = 0.001)]
    pub cv_cutoff_current: f64,

    /// Maximum CV hold time
    #[arg(long, default_value = "30m")]
    pub cv_hold_time: humantime::Duration,

    /// Maximum CC step time
    #[arg(long, default_value = "2h")]
    pub cc_timeout: humantime::Duration,

    /// Conditioning current for the formation preset (A)
    #[arg(long, default_value_t = 0.002)]
    pub formation_current: f64,

    /// Normal-rate current for the formation preset (A)
    #[arg(long, default_value_t = 0.020)]
    pub normal_current: f64,
}

#[derive(Debug, Args, Clone)]
pub struct StartArgs {
    /// SMU channel
    #[arg(long, default_value_t = 1)]
    pub channel: u32,

    /// How many times the server repeats the marked group
    #[arg(long, default_value_t = 1)]
    pub cycles: u32,

    /// Disable server-side data logging
    #[arg(long)]
    pub no_logging: bool,

    /// Test metadata as key=value, repeatable
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,

    /// Keep watching until the run finishes
    #[arg(long)]
    pub watch: bool,

    #[command(flatten)]
    pub watch_args: WatchArgs,

    #[command(flatten)]
    pub source: StepSource,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    /// Time between status requests
    #[arg(long, default_value = "30s")]
    pub interval: humantime::Duration,

    /// Write the final status to this file as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TelemetryCommand {
    /// Analysis of the step in progress
    StepAnalysis,
    /// Run-level performance metrics
    Performance,
    /// Raw data points for one channel
    ChannelData {
        #[arg(long, default_value_t = 1)]
        channel: u32,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Analysis over the stored data arrays
    Analysis {
        #[arg(long)]
        channel: Option<u32>,
    },
}

fn parse_meta(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig::new(args.base_url.clone()).with_timeout(Duration::from(args.timeout))
}

/// Resolve the step list from a file or a preset.
pub fn load_steps(source: &StepSource) -> Result<Vec<StepEntry>> {
    if let Some(path) = source.steps_file.as_deref() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read steps file {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("parse steps file {}", path.display()));
    }

    let steps = match source.preset {
        Preset::Standard => build_standard_cycle(&StandardCycle {
            charge_current: source.charge_current,
            discharge_current: source.discharge_current,
            charge_voltage: source.charge_voltage,
            discharge_voltage: source.discharge_voltage,
            cv_cutoff_current: source.cv_cutoff_current,
            cv_hold_time_s: Duration::from(source.cv_hold_time).as_secs_f64(),
            cc_timeout_s: Duration::from(source.cc_timeout).as_secs_f64(),
        }),
        Preset::Formation => build_formation_cycle(&FormationCycle {
            formation_current: source.formation_current,
            normal_current: source.normal_current,
            charge_voltage: source.charge_voltage,
            discharge_voltage: source.discharge_voltage,
        }),
    };
    Ok(steps)
}

/// Assemble the start request from CLI arguments.
pub fn build_definition(args: &StartArgs) -> Result<TestDefinition> {
    let steps = load_steps(&args.source)?;
    let mut def = TestDefinition::new(args.channel, steps)
        .cycles(args.cycles)
        .enable_logging(!args.no_logging);
    for (key, value) in &args.meta {
        def = def.metadata(key.clone(), value.clone());
    }
    Ok(def)
}

/// JSON form of a one-quantity reading: `{"channel": 1, "voltage": 3.71}`.
fn single_reading(channel: u32, quantity: &str, value: f64) -> serde_json::Value {
    let mut reading = serde_json::Map::new();
    reading.insert("channel".to_string(), channel.into());
    reading.insert(quantity.to_string(), value.into());
    reading.into()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    // Building the client does no I/O; `steps` never touches it.
    let cycler = TestOrchestrator::new(&cfg).context("build HTTP client")?;

    match args.command.clone() {
        Command::Steps(source) => print_json(&load_steps(&source)?),
        Command::Check => {
            if cycler.is_reachable().await {
                println!("Server at {} is reachable", cfg.base_url);
                Ok(())
            } else {
                Err(anyhow::anyhow!("server at {} is not reachable", cfg.base_url))
            }
        }
        Command::Validate(source) => {
            let steps = load_steps(&source)?;
            let report = cycler.validate(&steps).await.context("validate steps")?;
            if args.json {
                return print_json(&report);
            }
            println!(
                "{} ({} steps)",
                report.message.as_deref().unwrap_or("Step definition is valid"),
                report.total_steps.unwrap_or(steps.len())
            );
            Ok(())
        }
        Command::Start(start) => {
            let def = build_definition(&start)?;
            let receipt = cycler.start(&def).await.context("start test")?;
            if args.json {
                print_json(&receipt)?;
            } else {
                println!(
                    "{} (channel {}, {} cycles)",
                    receipt.message.as_deref().unwrap_or("Test started"),
                    receipt.channel.unwrap_or(def.channel),
                    receipt.cycles.unwrap_or(def.cycles)
                );
            }
            if start.watch {
                monitor(&cycler, &cfg, &start.watch_args, args.json).await?;
            }
            Ok(())
        }
        Command::Status => {
            let status = cycler.status().await.context("fetch status")?;
            if args.json {
                return print_json(&status);
            }
            let state = match (status.is_running, status.is_paused) {
                (true, true) => "paused",
                (true, false) => "running",
                _ => "idle",
            };
            println!("State: {state}");
            println!("{}", format_progress(&status));
            Ok(())
        }
        Command::Stop => control(cycler.stop().await.context("stop test")?, args.json),
        Command::Pause => control(cycler.pause().await.context("pause test")?, args.json),
        Command::Resume => control(cycler.resume().await.context("resume test")?, args.json),
        Command::Watch(watch) => monitor(&cycler, &cfg, &watch, args.json).await,
        Command::Telemetry(cmd) => {
            let telemetry = cycler.telemetry();
            let payload = match cmd {
                TelemetryCommand::StepAnalysis => telemetry.step_analysis().await,
                TelemetryCommand::Performance => telemetry.performance_metrics().await,
                TelemetryCommand::ChannelData { channel, limit } => {
                    telemetry.channel_data(channel, limit).await
                }
                TelemetryCommand::Analysis { channel } => telemetry.data_analysis(channel).await,
            }
            .context("fetch telemetry")?;
            print_json(&payload)
        }
        Command::Measure { channel, quantity } => {
            let smu = SmuClient::with_transport(cycler.transport().clone());
            match quantity {
                Quantity::Voltage => {
                    let v = smu.measure_voltage(channel).await.context("measure voltage")?;
                    if args.json {
                        return print_json(&single_reading(channel, "voltage", v));
                    }
                    println!("CH{channel}: {v:.4} V");
                }
                Quantity::Current => {
                    let a = smu.measure_current(channel).await.context("measure current")?;
                    if args.json {
                        return print_json(&single_reading(channel, "current", a));
                    }
                    println!("CH{channel}: {a:.6} A");
                }
                Quantity::Both => {
                    let m = smu
                        .measure_voltage_and_current(channel)
                        .await
                        .context("measure voltage and current")?;
                    if args.json {
                        return print_json(&m);
                    }
                    println!("CH{channel}: {:.4} V, {:.6} A", m.voltage, m.current);
                }
            }
            Ok(())
        }
    }
}

fn control(ack: smu_cycler::ControlAck, json: bool) -> Result<()> {
    if json {
        return print_json(&ack);
    }
    println!("{}", ack.message.as_deref().unwrap_or("OK"));
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn monitor(
    cycler: &TestOrchestrator,
    cfg: &ClientConfig,
    watch: &WatchArgs,
    json: bool,
) -> Result<()> {
    let interval = Duration::from(watch.interval);
    let poller = cycler.poller();

    let outcome = if json {
        let mut emit = |status: &RunStatus| {
            if let Ok(line) = serde_json::to_string(status) {
                println!("{line}");
            }
        };
        poller
            .wait_for_completion_or_abort(interval, Some(&mut emit), interrupted())
            .await
    } else {
        eprintln!("Waiting for test completion... (Ctrl-C stops watching only)");
        poller
            .wait_for_completion_or_abort(interval, None, interrupted())
            .await
    }
    .context("monitor run")?;

    let (status, completed) = match outcome {
        PollOutcome::Completed(status) => (Some(status), true),
        PollOutcome::Interrupted(last) => {
            eprintln!();
            (last, false)
        }
    };

    let processed = process_run_completion(
        &cfg.base_url,
        status.as_ref(),
        completed,
        watch.export_json.as_deref(),
    );
    if !json {
        for line in &processed.summary {
            println!("{line}");
        }
    }
    for msg in &processed.export_messages {
        eprintln!("{msg}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_args_collect_metadata_and_counts() {
        let cli = Cli::try_parse_from([
            "smu-cycler",
            "start",
            "--channel",
            "2",
            "--cycles",
            "5",
            "--meta",
            "batteryId=CELL_001",
            "--meta",
            "operator=lab",
            "--no-logging",
        ])
        .unwrap();
        let Command::Start(start) = cli.command else {
            panic!("expected start");
        };
        let def = build_definition(&start).unwrap();
        assert_eq!(def.channel, 2);
        assert_eq!(def.cycles, 5);
        assert!(!def.enable_logging);
        assert_eq!(def.metadata["batteryId"], "CELL_001");
        assert_eq!(def.metadata["operator"], "lab");
        assert_eq!(def.steps.len(), 6);
    }

    #[test]
    fn metadata_without_equals_is_refused() {
        assert!(parse_meta("batteryId").is_err());
        assert!(parse_meta("=x").is_err());
        assert_eq!(parse_meta("note=a=b").unwrap(), ("note".to_string(), "a=b".to_string()));
    }

    #[test]
    fn formation_preset_and_durations_map_to_steps() {
        let cli = Cli::try_parse_from([
            "smu-cycler",
            "steps",
            "--preset",
            "formation",
            "--formation-current",
            "0.001",
        ])
        .unwrap();
        let Command::Steps(source) = cli.command else {
            panic!("expected steps");
        };
        let steps = load_steps(&source).unwrap();
        assert_eq!(steps.len(), 10);
        assert_eq!(steps[1].as_step().unwrap().current, Some(0.001));

        let cli = Cli::try_parse_from(["smu-cycler", "steps", "--cv-hold-time", "1h"]).unwrap();
        let Command::Steps(source) = cli.command else {
            panic!("expected steps");
        };
        let steps = load_steps(&source).unwrap();
        assert_eq!(steps[2].as_step().unwrap().cutoffs.time_s, Some(3600.0));
    }

    #[test]
    fn steps_file_keeps_every_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.json");
        std::fs::write(
            &path,
            r#"[{"cycle":"start"},{"mode":"cc","current":0.01,"cutoff_time_s":3600,"cutoff_V_max":4.25},{"cycle":"end"}]"#,
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "smu-cycler",
            "validate",
            "--steps-file",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Validate(source) = cli.command else {
            panic!("expected validate");
        };
        let steps = load_steps(&source).unwrap();
        assert_eq!(steps.len(), 3);
        let wire = serde_json::to_value(&steps).unwrap();
        assert_eq!(wire[1]["cutoff_V_max"], serde_json::json!(4.25));
        assert!(smu_cycler::steps::check_steps(&steps).is_ok());
    }

    #[test]
    fn single_reading_names_the_quantity() {
        assert_eq!(
            single_reading(2, "current", -0.004),
            serde_json::json!({"channel": 2, "current": -0.004})
        );
    }

    #[tokio::test]
    async fn steps_command_needs_no_server() {
        let cli = Cli::try_parse_from([
            "smu-cycler",
            "steps",
            "--base-url",
            "http://127.0.0.1:1",
            "--timeout",
            "100ms",
        ])
        .unwrap();
        assert!(run(cli).await.is_ok());
    }

    #[test]
    fn global_flags_build_client_config() {
        let cli = Cli::try_parse_from([
            "smu-cycler",
            "status",
            "--base-url",
            "http://bench-4:3000",
            "--timeout",
            "3s",
        ])
        .unwrap();
        let cfg = build_config(&cli);
        assert_eq!(cfg.base_url, "http://bench-4:3000");
        assert_eq!(cfg.timeout, Duration::from_secs(3));
    }
}
