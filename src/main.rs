//! treadchirp: drive an audio-modem treadmill from the command line.
//!
//! Usage:
//!   treadchirp devices
//!   treadchirp send 3.5 2.0
//!   treadchirp pause --grade 2.0
//!   treadchirp wav chirp.wav 3.5 2.0
//!   treadchirp play chirp.wav
//!   treadchirp sweep 190 --interval-ms 2000
//!   printf '3.0 1.0\n4.5 2.0\n' | treadchirp stream

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tc_audio::{DeviceChannel, DEFAULT_DEVICE_INDEX};
use tc_ir::Setpoint;
use tc_master::{Config, Controller, MemoryChannel};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "treadchirp", version, about = "Send speed and incline commands to an audio-modem treadmill")]
struct Cli {
    /// Config file (default: platform config dir, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output device index; -1 is the system default
    #[arg(long, global = true, allow_hyphen_values = true)]
    device: Option<i32>,

    /// Output device name, overrides the config file
    #[arg(long, global = true)]
    device_name: Option<String>,

    /// Record to memory instead of opening audio hardware
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List output devices with their indices
    Devices,

    /// Send one speed/incline command
    Send {
        /// Speed in mph
        mph: f32,
        /// Incline in percent grade
        grade: f32,
        /// Skip the workout limit check
        #[arg(long)]
        raw: bool,
        /// Transmissions per command (default: from config)
        #[arg(long)]
        repeat: Option<usize>,
    },

    /// Stop the belt, keeping the given incline (sent once, not repeated)
    Pause {
        #[arg(long, default_value_t = 0.0)]
        grade: f32,
    },

    /// Put the treadmill in a known paused state
    Init {
        #[arg(long, default_value_t = 0.0)]
        grade: f32,
    },

    /// Print the 32-symbol frame for a command
    Frame { mph: f32, grade: f32 },

    /// Render a command to a WAV file instead of playing it
    Wav {
        out: PathBuf,
        mph: f32,
        grade: f32,
        #[arg(long)]
        raw: bool,
    },

    /// Play a previously rendered WAV file
    Play { file: PathBuf },

    /// Send (i, i) for every raw byte from <start> to 254, skipping the hard stop
    Sweep {
        start: u8,
        /// Pause between sends
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Read "mph grade" lines from stdin and send them in the background
    Stream,

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    let params = config.tone_params().context("Invalid tone settings")?;

    let channel: Arc<dyn DeviceChannel> = if cli.dry_run {
        Arc::new(MemoryChannel::new(Vec::<String>::new()))
    } else {
        Arc::new(tc_audio::CpalChannel::new())
    };
    let mut ctrl = Controller::new(channel, params);

    match cli.command {
        Command::Devices => list_devices(&ctrl),
        Command::Send {
            mph,
            grade,
            raw,
            repeat,
        } => {
            let setpoint = parse_setpoint(mph, grade, raw)?;
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            let count = repeat.unwrap_or(config.output.repeat);
            info!("Sending {} ({}x)", setpoint, count);
            ctrl.transmit_repeated(setpoint, device, count)
                .with_context(|| format!("Failed to send {}", setpoint))
        }
        Command::Pause { grade } => {
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            pause(&ctrl, grade, device)
        }
        Command::Init { grade } => {
            let incline = parse_setpoint(0.0, grade, true)?.incline;
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            ctrl.initialize(incline, device)
                .context("Failed to initialize treadmill")
        }
        Command::Frame { mph, grade } => {
            let setpoint = parse_setpoint(mph, grade, true)?;
            let frame = setpoint.encode();
            println!("Command:  {}", setpoint);
            println!("Speed:    {}", frame.speed());
            println!("Incline:  {}", frame.incline());
            println!("Checksum: {}", frame.checksum());
            println!("Symbols:  {}", frame);
            Ok(())
        }
        Command::Wav {
            out,
            mph,
            grade,
            raw,
        } => {
            let setpoint = parse_setpoint(mph, grade, raw)?;
            write_wav(&ctrl, setpoint, &out)
        }
        Command::Play { file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let block = tc_formats::load_wav(&data)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            info!("Playing {} ({} samples)", file.display(), block.len());
            ctrl.play_block(&block, device).context("Playback failed")
        }
        Command::Sweep { start, interval_ms } => {
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            ctrl.sweep(start, device, Duration::from_millis(interval_ms))
                .context("Sweep stopped")
        }
        Command::Stream => {
            let device = select_device(cli.device, cli.device_name.as_deref(), &config, &ctrl);
            stream(&mut ctrl, device)
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_setpoint(mph: f32, grade: f32, raw: bool) -> Result<Setpoint> {
    let setpoint = Setpoint::from_units(mph, grade)?;
    if !raw {
        setpoint
            .check_limits()
            .context("Use --raw to send it anyway")?;
    }
    Ok(setpoint)
}

/// `--device` wins, then `--device-name`, then the configured name.
fn select_device(index: Option<i32>, name: Option<&str>, config: &Config, ctrl: &Controller) -> i32 {
    if let Some(index) = index {
        return index;
    }
    match name.or(config.output.device_name.as_deref()) {
        Some(name) => ctrl.resolve_device(name),
        None => DEFAULT_DEVICE_INDEX,
    }
}

/// The stop pair goes out once; `[output] repeat` does not apply.
fn pause(ctrl: &Controller, grade: f32, device: i32) -> Result<()> {
    let incline = parse_setpoint(0.0, grade, true)?.incline;
    ctrl.pause(incline, device).context("Failed to pause")
}

fn list_devices(ctrl: &Controller) -> Result<()> {
    for device in ctrl.list_devices() {
        println!("{:>3}  {}", device.index, device.name);
    }
    Ok(())
}

fn write_wav(ctrl: &Controller, setpoint: Setpoint, path: &Path) -> Result<()> {
    let wav = ctrl.render_to_wav(setpoint);
    std::fs::write(path, &wav).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {} ({} bytes) for {}", path.display(), wav.len(), setpoint);
    Ok(())
}

fn stream(ctrl: &mut Controller, device: i32) -> Result<()> {
    ctrl.start_dispatcher()
        .context("Failed to start dispatcher")?;

    for (n, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let setpoint = match parse_stream_line(line) {
            Ok(setpoint) => setpoint,
            Err(e) => {
                warn!("Line {}: {:#}", n + 1, e);
                continue;
            }
        };
        ctrl.submit(setpoint, device)?;
    }

    if let Some(dispatcher) = ctrl.dispatcher() {
        dispatcher.wait_idle();
        if let Some(e) = dispatcher.last_error() {
            warn!("Last transmission failed: {}", e);
        }
    }
    if let Some(stats) = ctrl.stop_dispatcher() {
        info!(
            "Submitted {}, sent {}, coalesced {}, failed {}",
            stats.submitted, stats.sent, stats.coalesced, stats.failed
        );
    }
    Ok(())
}

fn parse_stream_line(line: &str) -> Result<Setpoint> {
    let mut fields = line.split_whitespace();
    let (Some(mph), Some(grade), None) = (fields.next(), fields.next(), fields.next()) else {
        bail!("expected \"mph grade\", got {:?}", line);
    };
    let mph: f32 = mph.parse().with_context(|| format!("bad speed {:?}", mph))?;
    let grade: f32 = grade.parse().with_context(|| format!("bad grade {:?}", grade))?;
    parse_setpoint(mph, grade, false)
}
