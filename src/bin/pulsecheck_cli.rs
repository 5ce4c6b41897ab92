use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pulsecheck::analysis::grid::GridResolution;
use pulsecheck::pipeline::AudioPipeline;
use pulsecheck::server;

/// Chunk size used when streaming a WAV file through the pipeline (~93 ms)
const ANALYZE_CHUNK: usize = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "pulsecheck",
    about = "Rhythm-practice analyzer: blind metronome tracking and timing feedback"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the WebSocket session server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
    },
    /// Stream a recorded WAV file through the pipeline and print the events
    Analyze {
        /// Input WAV file (a recorded practice session)
        #[arg(long)]
        input: PathBuf,
        /// Grid resolution to score against
        #[arg(long, default_value = "8th")]
        grid: String,
        /// On-time threshold in milliseconds
        #[arg(long, default_value_t = 30.0)]
        threshold: f64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

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
    match cli.command {
        Commands::Serve { addr } => run_serve(addr),
        Commands::Analyze {
            input,
            grid,
            threshold,
        } => run_analyze(&input, &grid, threshold),
    }
}

fn run_serve(addr: SocketAddr) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(server::run_server(addr))?;
    Ok(ExitCode::from(0))
}

fn run_analyze(input: &PathBuf, grid: &str, threshold: f64) -> Result<ExitCode> {
    let resolution = match grid {
        "8th" => GridResolution::Eighth,
        "16th" => GridResolution::Sixteenth,
        other => anyhow::bail!("unknown grid resolution '{other}' (expected 8th or 16th)"),
    };

    let (samples, sample_rate) =
        read_wav(input).with_context(|| format!("reading {}", input.display()))?;

    let mut pipeline = AudioPipeline::new(resolution, sample_rate, threshold, None);
    for chunk in samples.chunks(ANALYZE_CHUNK) {
        for event in pipeline.process_audio(chunk) {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    println!("{}", serde_json::to_string(&pipeline.generate_report())?);

    Ok(ExitCode::from(0))
}

/// Load a WAV file as mono f32 samples
///
/// Integer PCM is normalized to [-1, 1]; multi-channel files are mixed down
/// by averaging.
fn read_wav(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}
