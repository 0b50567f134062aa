use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tdoa_localizer::pipeline::stream::{write_wav, StreamEvent, WavChunkSource};
use tdoa_localizer::report::InboundMessage;
use tdoa_localizer::{
    init_logging, run_stream, AppConfig, Localizer, OutboundMessage, Position, PulseShape,
    SimulationContext,
};

#[derive(Parser, Debug)]
#[command(
    name = "tdoa_cli",
    about = "Locate an acoustic source from four-receiver time differences of arrival"
)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Solve for delays given in seconds, non-reference receivers in ascending order
    Solve {
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        tdoa: Vec<f64>,
    },
    /// Simulate a source and localize it from the ideal delays
    Simulate {
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        source: Vec<f64>,
        /// Also render a pulse train for the source to this WAV file
        #[arg(long)]
        wav: Option<PathBuf>,
        #[arg(long, default_value_t = 3)]
        pulses: usize,
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },
    /// Stream a four-channel WAV recording and localize every detected event
    Wav {
        #[arg(long)]
        file: PathBuf,
    },
    /// Answer JSON messages read line by line ("-" for stdin)
    Messages {
        #[arg(long, default_value = "-")]
        input: String,
    },
    /// Print the effective configuration
    DumpConfig,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    });

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Solve { tdoa } => run_solve(&config, &tdoa),
        Commands::Simulate {
            source,
            wav,
            pulses,
            seconds,
        } => run_simulate(&config, &source, wav.as_deref(), pulses, seconds),
        Commands::Wav { file } => run_wav(&config, &file),
        Commands::Messages { input } => run_messages(&config, &input),
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn run_solve(config: &AppConfig, tdoa: &[f64]) -> Result<ExitCode> {
    ensure!(tdoa.len() == 3, "expected 3 delays, got {}", tdoa.len());
    let mut localizer = Localizer::new(config).context("building localizer")?;

    match localizer.locate_from_tdoa([tdoa[0], tdoa[1], tdoa[2]]) {
        Ok(localization) => {
            println!("{}", OutboundMessage::from_localization(&localization).to_json()?);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            println!("{}", OutboundMessage::error(&err).to_json()?);
            Ok(ExitCode::from(2))
        }
    }
}

fn run_simulate(
    config: &AppConfig,
    source: &[f64],
    wav: Option<&Path>,
    pulses: usize,
    seconds: f64,
) -> Result<ExitCode> {
    ensure!(source.len() == 3, "expected x,y,z, got {} values", source.len());
    ensure!(seconds > 0.0, "--seconds must be positive");
    let position = Position::new(source[0], source[1], source[2]);
    let mut localizer = Localizer::new(config).context("building localizer")?;
    let context = SimulationContext::new(position, config.solver.speed_of_sound);

    if let Some(path) = wav {
        let sample_rate = config.delay.sample_rate;
        let pulse = PulseShape {
            sample_rate,
            length: (seconds * sample_rate as f64) as usize,
            emission_sample: config.delay.fft_size as f64,
            width: 1.5 / sample_rate as f64,
            count: pulses,
            interval: seconds / (pulses.max(1) as f64 + 1.0),
            ..PulseShape::default()
        };
        let channels = context
            .synthesize(localizer.array(), &pulse)
            .context("synthesizing pulse train")?;
        write_wav(path, &channels, sample_rate)
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Wrote {} frames to {}", pulse.length, path.display());
    }

    match localizer.simulate(&context) {
        Ok(localization) => {
            println!("{}", OutboundMessage::from_localization(&localization).to_json()?);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            println!("{}", OutboundMessage::error(&err).to_json()?);
            Ok(ExitCode::from(2))
        }
    }
}

fn run_wav(config: &AppConfig, file: &Path) -> Result<ExitCode> {
    let source =
        WavChunkSource::open(file).with_context(|| format!("opening {}", file.display()))?;
    let summary = run_stream(source, config)
        .with_context(|| format!("streaming {}", file.display()))?;

    for event in &summary.events {
        println!("{}", serde_json::to_string(&EventLine::from(event))?);
    }

    let report = SummaryPayload {
        file: file.display().to_string(),
        frames: summary.frames,
        events: summary.events.len(),
        localized: summary.localized().count(),
        rejected: summary.rejected,
        dropped: summary.dropped,
    };
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_messages(config: &AppConfig, input: &str) -> Result<ExitCode> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = fs::File::open(input).with_context(|| format!("opening {}", input))?;
        Box::new(BufReader::new(file))
    };
    let mut localizer = Localizer::new(config).context("building localizer")?;

    for line in reader.lines() {
        let line = line.context("reading message")?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match InboundMessage::from_json(&line) {
            Ok(message) => message.handle(&mut localizer),
            Err(err) => OutboundMessage::Error {
                msg: format!("Invalid message: {}", err),
            },
        };
        println!("{}", reply.to_json()?);
    }
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct EventLine {
    start: u64,
    end: u64,
    window_start: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    band_ratio: Option<f64>,
    message: OutboundMessage,
}

impl From<&StreamEvent> for EventLine {
    fn from(event: &StreamEvent) -> Self {
        let message = match &event.outcome {
            Ok(localization) => OutboundMessage::from_localization(localization),
            Err(err) => OutboundMessage::error(err),
        };
        Self {
            start: event.segment.start,
            end: event.segment.end,
            window_start: event.window_start,
            band_ratio: event.band_energy.map(|energy| energy.ratio()),
            message,
        }
    }
}

#[derive(Serialize)]
struct SummaryPayload {
    file: String,
    frames: u64,
    events: usize,
    localized: usize,
    rejected: usize,
    dropped: usize,
}
