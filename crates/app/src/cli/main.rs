//! Clarion CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clarion_core::domain::gain::EqPreset;
use clarion_core::domain::settings::GainSettings;
use clarion_infra::audio::{PipelineController, SyntheticBackend};

#[derive(Parser)]
#[command(name = "clarion")]
#[command(about = "A real-time hearing-assist audio pipeline", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List speech-relevant input and output devices
    Devices,

    /// Run the capture/process/render pipeline
    Run {
        /// Input device name (system default when omitted)
        #[arg(long)]
        input: Option<String>,

        /// Output device name (system default when omitted)
        #[arg(long)]
        output: Option<String>,

        /// Use the synthetic tone backend instead of hardware
        #[arg(long)]
        synthetic: bool,

        /// Amplification factor override (0.1 - 100.0)
        #[arg(long)]
        amplification: Option<f32>,

        /// Enable noise reduction
        #[arg(long)]
        noise_reduction: bool,

        /// Equalizer preset: flat, bass-boost, treble-boost,
        /// vocal-boost, bass-reduction, custom
        #[arg(long)]
        preset: Option<String>,

        /// Stop after this many seconds (Ctrl-C otherwise)
        #[arg(long)]
        duration: Option<u64>,

        /// Settings file (defaults to the user config directory)
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Command::Devices => list_devices(),
        Command::Run {
            input,
            output,
            synthetic,
            amplification,
            noise_reduction,
            preset,
            duration,
            settings,
        } => {
            run_pipeline(
                input,
                output,
                synthetic,
                amplification,
                noise_reduction,
                preset,
                duration,
                settings,
            )
            .await
        }
    }
}

fn list_devices() -> anyhow::Result<()> {
    let controller = PipelineController::new();

    println!("Input devices:");
    for device in controller.list_input_devices() {
        println!("  {:<40} {:?}", device.display_name, device.class);
    }

    println!("Output devices:");
    for device in controller.list_output_devices() {
        println!("  {:<40} {:?}", device.display_name, device.class);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    input: Option<String>,
    output: Option<String>,
    synthetic: bool,
    amplification: Option<f32>,
    noise_reduction: bool,
    preset: Option<String>,
    duration: Option<u64>,
    settings: Option<PathBuf>,
) -> anyhow::Result<()> {
    let controller = if synthetic {
        let backend = Arc::new(SyntheticBackend::default());
        PipelineController::with_backend(backend.clone(), backend)
    } else {
        PipelineController::new()
    };

    // Persisted settings first, CLI overrides on top
    let settings_path = settings.unwrap_or_else(GainSettings::default_path);
    match controller.load_settings(&settings_path).await {
        Ok(()) => tracing::info!(path = %settings_path.display(), "settings loaded"),
        Err(e) => tracing::info!(path = %settings_path.display(), "using defaults ({e})"),
    }

    if let Some(factor) = amplification {
        controller.set_amplification_factor(factor);
    }
    if noise_reduction {
        controller.set_noise_reduction(true);
    }
    if let Some(name) = preset.as_deref() {
        let preset = parse_preset(name)
            .with_context(|| format!("unknown equalizer preset '{name}'"))?;
        controller.apply_preset(preset);
    }

    if let Some(name) = input.as_deref() {
        let device = controller
            .list_input_devices()
            .into_iter()
            .find(|d| d.display_name.contains(name))
            .with_context(|| format!("no input device matching '{name}'"))?;
        controller.set_input_device(device)?;
    }
    if let Some(name) = output.as_deref() {
        let device = controller
            .list_output_devices()
            .into_iter()
            .find(|d| d.display_name.contains(name))
            .with_context(|| format!("no output device matching '{name}'"))?;
        controller.set_output_device(device)?;
    }

    controller.start_audio().context("failed to start audio")?;
    tracing::info!(
        amplification = controller.amplification_factor(),
        noise_reduction = controller.noise_reduction(),
        preset = ?controller.active_preset(),
        "pipeline running"
    );

    run_meter_loop(&controller, duration).await;

    controller.stop_audio();
    if let Err(e) = controller.save_settings(&settings_path).await {
        tracing::warn!(path = %settings_path.display(), "failed to save settings: {e}");
    }

    Ok(())
}

/// Print a coarse output level meter until Ctrl-C or the deadline
async fn run_meter_loop(controller: &PipelineController, duration: Option<u64>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let history = controller.output_waveform();
                if let Some(frame) = history.last() {
                    let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(*s));
                    let bars = (peak * 40.0) as usize;
                    println!("out [{:<40}] {:.2}", "#".repeat(bars), peak);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::info!("duration elapsed, shutting down");
                break;
            }
        }
    }
}

fn parse_preset(name: &str) -> Option<EqPreset> {
    match name.to_lowercase().as_str() {
        "custom" => Some(EqPreset::Custom),
        "flat" => Some(EqPreset::Flat),
        "bass-boost" => Some(EqPreset::BassBoost),
        "treble-boost" => Some(EqPreset::TrebleBoost),
        "vocal-boost" => Some(EqPreset::VocalBoost),
        "bass-reduction" => Some(EqPreset::BassReduction),
        _ => None,
    }
}
