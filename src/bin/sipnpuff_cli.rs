use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sipnpuff_tuner::calibration::ThresholdSuggestion;
use sipnpuff_tuner::link::{list_ports, DisconnectReason, ScriptedTransport};
use sipnpuff_tuner::{
    ActionSampleSet, AppConfig, CalibrationAction, DeviceSettings, LinkError, LinkStatus,
    SessionNotice, TelemetryStream, ThresholdSet, ThresholdSuggester, TunerHandle,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::Level;

#[path = "sipnpuff_cli/summary.rs"]
mod summary;
use summary::{drain_events, TelemetryAggregator};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("sipnpuff_cli error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sipnpuff_cli",
    about = "Serial tuner harness for the sip-and-puff controller"
)]
struct Cli {
    /// Configuration file (defaults to assets/tuner_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports, USB devices first
    Ports,
    /// Connect to a device and summarise its telemetry
    Monitor(MonitorArgs),
    /// Decode a captured telemetry log as if it came from the device
    Replay(ReplayArgs),
    /// Suggest thresholds from a recorded sample corpus
    Suggest(SuggestArgs),
    /// Push a settings file to the device
    Apply(ApplyArgs),
    /// Run a guided calibration and print the suggested thresholds
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[arg(long)]
    port: String,
    /// How long to listen before disconnecting (milliseconds)
    #[arg(long, default_value_t = 5_000)]
    duration_ms: u64,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Raw capture of device output
    #[arg(long)]
    file: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct SuggestArgs {
    /// JSON map of action name to recorded pressure samples
    #[arg(long)]
    samples: PathBuf,
    /// Thresholds in use, as HST,NMIN,NMAX,SPT,HPT
    #[arg(long)]
    current: Option<String>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[arg(long)]
    port: String,
    /// Settings JSON, flat or under a "settings" key
    #[arg(long)]
    settings: PathBuf,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    #[arg(long)]
    port: String,
    /// Actions to record, in order
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "neutral,soft-sip,hard-sip,soft-puff,hard-puff"
    )]
    actions: Vec<CalibrationAction>,
    /// Time to get ready before each recording window (milliseconds)
    #[arg(long, default_value_t = 2_000)]
    pause_ms: u64,
    /// Adopt and push the suggested thresholds
    #[arg(long, default_value_t = false)]
    apply: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Ports => run_ports(),
            Command::Monitor(args) => run_monitor(config, args).await,
            Command::Replay(args) => run_replay(config, args).await,
            Command::Suggest(args) => run_suggest(args),
            Command::Apply(args) => run_apply(config, args).await,
            Command::Calibrate(args) => run_calibrate(config, args).await,
        }
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run_ports() -> Result<ExitCode> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(ExitCode::from(0));
    }
    for port in ports {
        println!("{:<24} {}", port.name, port.description);
    }
    Ok(ExitCode::from(0))
}

async fn run_monitor(config: AppConfig, args: MonitorArgs) -> Result<ExitCode> {
    let stream = TelemetryStream::new(config.link.link_settings());
    let mut events = stream.subscribe_all();
    let mut status = stream.subscribe_status();

    stream
        .connect(&args.port)
        .with_context(|| format!("connecting to {}", args.port))?;

    let disconnect = tokio::time::timeout(
        Duration::from_millis(args.duration_ms),
        wait_for_disconnect(&mut status),
    )
    .await
    .ok()
    .flatten();
    if disconnect.is_none() {
        stream.disconnect().context("closing link")?;
    }

    let mut aggregator = TelemetryAggregator::default();
    drain_events(&mut events, &mut aggregator);
    let report = aggregator.into_report(stream.counters(), disconnect.map(|r| r.to_string()));
    emit_report(&report, args.format)?;
    Ok(ExitCode::from(0))
}

async fn run_replay(config: AppConfig, args: ReplayArgs) -> Result<ExitCode> {
    let bytes = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let label = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("replay")
        .to_string();

    let stream = TelemetryStream::new(config.link.link_settings());
    let mut events = stream.subscribe_all();
    let mut status = stream.subscribe_status();

    // A short capture can drain before the handshake goes out.
    let (transport, _script) = ScriptedTransport::replay(&bytes);
    match stream.connect_with(Box::new(transport), &label) {
        Ok(()) | Err(LinkError::NotConnected) => {}
        Err(err) => return Err(err).context("starting replay"),
    }

    // The replay transport fails once drained, which ends the session.
    let disconnect =
        tokio::time::timeout(Duration::from_secs(10), wait_for_disconnect(&mut status))
            .await
            .context("replay did not finish")?;

    let mut aggregator = TelemetryAggregator::default();
    drain_events(&mut events, &mut aggregator);
    let report = aggregator.into_report(stream.counters(), disconnect.map(|r| r.to_string()));
    emit_report(&report, args.format)?;
    Ok(ExitCode::from(0))
}

fn run_suggest(args: SuggestArgs) -> Result<ExitCode> {
    let contents = fs::read_to_string(&args.samples)
        .with_context(|| format!("reading {}", args.samples.display()))?;
    let samples: ActionSampleSet = serde_json::from_str(&contents)
        .with_context(|| format!("parsing sample corpus {}", args.samples.display()))?;
    if samples.is_empty() {
        bail!("sample corpus {} has no recordings", args.samples.display());
    }

    let current = match &args.current {
        Some(text) => parse_thresholds(text)?,
        None => ThresholdSet::DEFAULT,
    };
    let suggestion = ThresholdSuggester::new().derive(&samples, &current, &ThresholdSet::DEFAULT);
    print_suggestion(&suggestion)?;
    Ok(ExitCode::from(0))
}

async fn run_apply(config: AppConfig, args: ApplyArgs) -> Result<ExitCode> {
    let contents = fs::read_to_string(&args.settings)
        .with_context(|| format!("reading {}", args.settings.display()))?;
    let settings: DeviceSettings = serde_json::from_str(&contents)
        .with_context(|| format!("parsing settings {}", args.settings.display()))?;

    let tuner = TunerHandle::from_config(AppConfig {
        device: settings,
        ..config
    });
    tuner
        .connect(&args.port)
        .await
        .with_context(|| format!("applying settings on {}", args.port))?;
    println!("Applied settings to {}", args.port);
    tuner.shutdown().await.context("closing link")?;
    Ok(ExitCode::from(0))
}

async fn run_calibrate(config: AppConfig, args: CalibrateArgs) -> Result<ExitCode> {
    if args.actions.is_empty() {
        bail!("Provide at least one action via --actions");
    }

    let window = config.calibration.recording_window();
    let tuner = TunerHandle::from_config(config);
    tuner
        .connect(&args.port)
        .await
        .with_context(|| format!("connecting to {}", args.port))?;

    let calibration = tuner.calibration().clone();
    let mut notices = calibration.subscribe_notices();
    calibration.start_stream().await?;

    for action in &args.actions {
        println!("Get ready: {action}");
        tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
        calibration.begin_recording(*action).await?;
        let committed = tokio::time::timeout(
            window + Duration::from_secs(2),
            wait_for_commit(&mut notices, *action),
        )
        .await
        .with_context(|| format!("recording for {action} did not finish"))??;
        println!("{}", committed.describe());
    }

    calibration.stop_stream().await?;
    let suggestion = tuner.suggest_thresholds().await?;
    print_suggestion(&suggestion)?;

    if args.apply {
        tuner
            .apply_suggested_thresholds(&suggestion.thresholds)
            .await?;
        println!("Applied suggested thresholds");
    }

    tuner.shutdown().await.context("closing link")?;
    Ok(ExitCode::from(0))
}

async fn wait_for_disconnect(
    status: &mut broadcast::Receiver<LinkStatus>,
) -> Option<DisconnectReason> {
    loop {
        match status.recv().await {
            Ok(LinkStatus::Disconnected { reason }) => return Some(reason),
            Ok(LinkStatus::Connected { .. }) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn wait_for_commit(
    notices: &mut broadcast::Receiver<SessionNotice>,
    action: CalibrationAction,
) -> Result<SessionNotice> {
    loop {
        match notices.recv().await {
            Ok(notice) => match &notice {
                SessionNotice::RecordingCommitted { action: done, .. } if *done == action => {
                    return Ok(notice);
                }
                SessionNotice::LinkLost { .. } => bail!("{}", notice.describe()),
                _ => continue,
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("calibration controller stopped"),
        }
    }
}

fn parse_thresholds(text: &str) -> Result<ThresholdSet> {
    let values = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u16>()
                .with_context(|| format!("invalid threshold value {part:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match values.as_slice() {
        [hst, nmin, nmax, spt, hpt] => Ok(ThresholdSet::new(*hst, *nmin, *nmax, *spt, *hpt)),
        _ => bail!(
            "expected five thresholds HST,NMIN,NMAX,SPT,HPT, got {}",
            values.len()
        ),
    }
}

fn print_suggestion(suggestion: &ThresholdSuggestion) -> Result<()> {
    let json =
        serde_json::to_string_pretty(suggestion).context("serializing threshold suggestion")?;
    println!("{json}");
    Ok(())
}

fn emit_report(report: &summary::TelemetryReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => report.print_json(),
        OutputFormat::Table => {
            report.print_table();
            Ok(())
        }
    }
}
