//! `catprint`: print images and text on an MXW01 cat printer.
//!
//! Image work runs on a blocking thread before the printer is contacted,
//! so a bad file or setting fails without touching Bluetooth.

mod config;
mod validation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use catprinter::pipeline::{self, render_bitmap};
use catprinter::protocol::PrinterProfile;
use catprinter::{BatteryLevel, BatteryMonitor, BleTransport, PrintJob, TransferController, prepare_job};
use clap::{Args, Parser, Subcommand};
use image_processor::text::{DEFAULT_FONT_SIZE, TextFont, TextLayout, render_text};
use image_processor::{DitherMethod, ProcessingSettings, RasterImage, Rotation, SettingsStore, SettingsUpdate};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "catprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an image file
    Print {
        image: PathBuf,

        #[command(flatten)]
        processing: ProcessingArgs,
    },

    /// Render text with a TrueType font and print it
    Text {
        text: String,

        /// Font file (.ttf / .otf)
        #[arg(long, value_name = "FILE")]
        font: PathBuf,

        #[arg(long, default_value_t = DEFAULT_FONT_SIZE)]
        font_size: f32,

        /// Write a PNG preview instead of printing
        #[arg(long, value_name = "FILE")]
        preview: Option<PathBuf>,

        #[command(flatten)]
        processing: ProcessingArgs,
    },

    /// Dither an image and save the result as PNG without printing
    Preview {
        image: PathBuf,

        #[arg(short, long, value_name = "FILE", default_value = "preview.png")]
        output: PathBuf,

        #[command(flatten)]
        processing: ProcessingArgs,
    },

    /// Query the printer's battery level
    Battery,

    /// List nearby printers
    Scan,

    /// Show the effective configuration and processing settings
    Settings {
        #[command(flatten)]
        processing: ProcessingArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ProcessingArgs {
    /// threshold, floyd-steinberg, atkinson or halftone
    #[arg(long)]
    dither: Option<DitherMethod>,

    /// Luminance cut-off (0-255)
    #[arg(long)]
    threshold: Option<u8>,

    /// Swap black and white
    #[arg(long)]
    invert: bool,

    /// Output width in dots
    #[arg(long)]
    width: Option<u32>,

    /// Keep the source size instead of scaling to the paper width
    #[arg(long)]
    no_autoscale: bool,

    /// White margin in dots
    #[arg(long)]
    padding: Option<u32>,

    /// Clockwise rotation in degrees (multiple of 90)
    #[arg(long, allow_negative_numbers = true)]
    rotate: Option<i32>,
}

impl ProcessingArgs {
    fn to_update(&self) -> anyhow::Result<SettingsUpdate> {
        Ok(SettingsUpdate {
            dither_method: self.dither,
            threshold: self.threshold,
            invert: self.invert.then_some(true),
            width: self.width,
            autoscale: self.no_autoscale.then_some(false),
            padding: self.padding,
            rotation: self.rotate.map(Rotation::from_degrees).transpose()?,
        })
    }

    fn settings(&self) -> anyhow::Result<ProcessingSettings> {
        let mut store = SettingsStore::default();
        let settings = store
            .update(&self.to_update()?)
            .context("invalid processing settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Print { image, processing } => {
            let settings = processing.settings()?;
            let raster = RasterImage::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?;
            let profile = config.profile()?;
            let job = prepare(raster, settings, Arc::clone(&profile)).await?;
            print_job(&config, profile, &job).await
        }
        Commands::Text {
            text,
            font,
            font_size,
            preview,
            processing,
        } => {
            ensure_text(&text)?;
            let settings = processing.settings()?;
            let font = TextFont::open(&font)
                .with_context(|| format!("failed to load font {}", font.display()))?;
            let layout = TextLayout {
                font_size,
                ..TextLayout::default()
            };
            let (raster, summary) = render_text(&text, &font, &layout)?;
            tracing::info!(
                lines = summary.total_lines,
                height = summary.print_height,
                characters = summary.characters,
                "Text rendered"
            );

            if let Some(out) = preview {
                let (bitmap, _) = render_bitmap(&raster, &settings)?;
                save_preview(&bitmap, &out)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let profile = config.profile()?;
            let job = prepare(raster, settings, Arc::clone(&profile)).await?;
            print_job(&config, profile, &job).await
        }
        Commands::Preview {
            image,
            output,
            processing,
        } => {
            let settings = processing.settings()?;
            let raster = RasterImage::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?;
            let (bitmap, summary) =
                tokio::task::spawn_blocking(move || render_bitmap(&raster, &settings)).await??;
            save_preview(&bitmap, &output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Battery => {
            let profile = config.profile()?;
            let transport =
                BleTransport::connect_to(&config.printer_address, profile, config.scan_timeout())
                    .await
                    .context("failed to connect to printer")?;
            let controller = TransferController::new(transport);
            let result = controller.query_battery().await;
            disconnect(controller).await;

            let percent = result.context("battery query failed")?;
            println!(
                "{}",
                serde_json::json!({
                    "percent": percent,
                    "level": BatteryLevel::from_percent(percent),
                })
            );
            Ok(())
        }
        Commands::Scan => {
            let profile = config.profile()?;
            let adapter = catprinter::ble::default_adapter().await?;
            let devices =
                catprinter::ble::scan_devices(&adapter, profile.as_ref(), config.scan_timeout())
                    .await?;
            if devices.is_empty() {
                println!("No printers found");
            }
            for device in devices {
                let name = if device.name.is_empty() { "(unnamed)" } else { &device.name };
                println!("{}\t{}", device.id, name);
            }
            Ok(())
        }
        Commands::Settings { processing } => {
            let settings = processing.settings()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "config": config,
                    "processing": settings,
                }))?
            );
            Ok(())
        }
    }
}

fn ensure_text(text: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!text.trim().is_empty(), "No text to print");
    Ok(())
}

/// Run the CPU stages off the async runtime.
async fn prepare(
    raster: RasterImage,
    settings: ProcessingSettings,
    profile: Arc<dyn PrinterProfile>,
) -> anyhow::Result<PrintJob> {
    let job = tokio::task::spawn_blocking(move || prepare_job(&raster, &settings, profile.as_ref()))
        .await?
        .context("failed to prepare print job")?;
    Ok(job)
}

async fn print_job(
    config: &AppConfig,
    profile: Arc<dyn PrinterProfile>,
    job: &PrintJob,
) -> anyhow::Result<()> {
    let options = config.transfer_options(profile.as_ref());
    let transport =
        BleTransport::connect_to(&config.printer_address, profile, config.scan_timeout())
            .await
            .context("failed to connect to printer")?;
    tracing::info!(id = transport.id(), "Printer connected");

    let controller = TransferController::new(transport);
    let monitor = BatteryMonitor::spawn(controller.clone(), config.battery_interval());

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current chunk");
                cancel.cancel();
            }
        })
    };

    let result = pipeline::print(&controller, job, &options, &cancel).await;

    interrupt.abort();
    monitor.shutdown().await;
    if let Some(percent) = controller.connection_state().last_known_battery_percent {
        tracing::info!(percent, level = ?BatteryLevel::from_percent(percent), "Battery");
    }
    disconnect(controller).await;

    let report = result.context("print failed")?;
    println!(
        "Printed {} rows ({} chunks, {} bytes) in {:.1}s",
        job.frame.rows(),
        report.chunks_sent,
        report.bytes_sent,
        report.elapsed.as_secs_f32()
    );
    Ok(())
}

async fn disconnect(controller: TransferController<BleTransport>) {
    match controller.try_into_transport() {
        Ok(transport) => {
            if let Err(e) = transport.disconnect().await {
                tracing::warn!("Disconnect failed: {e}");
            }
        }
        Err(_) => tracing::warn!("Printer still in use, dropping connection"),
    }
}

fn save_preview(bitmap: &image_processor::MonochromeBitmap, path: &Path) -> anyhow::Result<()> {
    bitmap
        .to_gray_image()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "Preview saved");
    Ok(())
}
