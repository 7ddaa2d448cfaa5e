//! Projexture CLI
//!
//! Entry point for scanning a model's texture layout and projecting images
//! onto it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::Rng;

use projexture::bitmap::{PixelImage, TextureFormat, BLACK, WHITE};
use projexture::config::ProjectConfig;
use projexture::projection::{HoleFiller, Projector};
use projexture::scan::{
    FileStimulusSink, PatternGenerator, ReplayCapture, ScanRunner, ScanSession, ScanWorker, StimulusSink, WorkerEvent,
};

#[derive(Parser)]
#[command(name = "projexture")]
#[command(author, version, about = "Structured light UV texture reverser", long_about = None)]
struct Cli {
    /// Project config file (JSON or XML), defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the stimulus for one scan step
    Stimulus {
        /// 1-based step number
        step: u32,

        /// Output texture, defaults to the configured texture path
        output: Option<PathBuf>,
    },

    /// Build a projection map from recorded captures
    Scan {
        /// Directory of captures, one per step in file name order
        captures: PathBuf,

        /// Output projection map (PNG)
        output: PathBuf,

        /// Write each stimulus to the configured texture path while scanning
        #[arg(long)]
        write_stimuli: bool,

        /// Ingest captures on a background worker
        #[arg(long)]
        background: bool,
    },

    /// Project an overlay through a projection map
    Project {
        /// Projection map (PNG)
        map: PathBuf,

        /// Overlay image, same size as the map
        overlay: PathBuf,

        /// Output texture
        output: PathBuf,

        /// Hole filling passes, overrides the config
        #[arg(long)]
        fill_passes: Option<u32>,

        /// log2 of the saved texture size, overrides the config
        #[arg(long)]
        output_size: Option<u32>,

        /// Also write the overlay composited over the map
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Fill single-texel holes in a texture
    FillHoles {
        input: PathBuf,
        output: PathBuf,

        /// Number of passes
        #[arg(short, long, default_value = "1")]
        passes: u32,
    },

    /// Write a checkerboard test texture
    Checkerboard {
        /// Output texture, defaults to the configured texture path
        output: Option<PathBuf>,

        /// Number of cell bits, defaults to the configured scan depth
        #[arg(long)]
        scan_size: Option<u32>,
    },

    /// Write a random solid color texture to check the render pipeline
    TestTexture {
        /// Output texture, defaults to the configured texture path
        output: Option<PathBuf>,
    },

    /// Write a default project config
    InitConfig {
        /// Destination, defaults to the user config directory
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Stimulus { step, output } => {
            let session = config.scan.session()?;
            let Some(stimulus) = session.stimulus_for_step(step) else {
                bail!("step {} is outside 1..={}", step, session.total_steps());
            };
            let path = output.unwrap_or_else(|| config.scan.texture_path.clone());
            stimulus
                .render(session.stimulus_size())
                .save(&path, TextureFormat::Auto)
                .with_context(|| format!("writing stimulus to {}", path.display()))?;
            log::info!("Wrote {} (step {} of {}) to {}", stimulus, step, session.total_steps(), path.display());
        }

        Commands::Scan {
            captures,
            output,
            write_stimuli,
            background,
        } => {
            let session = config.scan.session()?;
            let replay = ReplayCapture::from_dir(&captures)
                .with_context(|| format!("reading captures from {}", captures.display()))?;
            if replay.remaining() < session.total_steps() as usize {
                log::warn!(
                    "Only {} captures for {} steps",
                    replay.remaining(),
                    session.total_steps()
                );
            }

            let sink = write_stimuli.then(|| FileStimulusSink::new(&config.scan.texture_path, TextureFormat::Auto));
            let session = if background {
                scan_in_background(session, replay, sink)?
            } else {
                scan_in_foreground(session, replay, sink)?
            };

            let map = session
                .projection_map()
                .context("scan finished without a projection map")?;
            map.save(&output, TextureFormat::Png)
                .with_context(|| format!("writing projection map to {}", output.display()))?;
            log::info!("Saved projection map to {}", output.display());
        }

        Commands::Project {
            map,
            overlay,
            output,
            fill_passes,
            output_size,
            preview,
        } => {
            let mut projection = config.projection.clone();
            if let Some(passes) = fill_passes {
                projection.fill_passes = passes;
            }
            if output_size.is_some() {
                projection.output_size = output_size;
            }
            projection.validate()?;

            let map = PixelImage::load(&map).with_context(|| format!("loading map {}", map.display()))?;
            let overlay =
                PixelImage::load(&overlay).with_context(|| format!("loading overlay {}", overlay.display()))?;

            if let Some(path) = preview {
                Projector::preview(&map, &overlay)?.save(&path, TextureFormat::Png)?;
                log::info!("Saved preview to {}", path.display());
            }

            let texture = projection.job().run(&map, &overlay)?;
            texture
                .save(&output, TextureFormat::Auto)
                .with_context(|| format!("writing texture to {}", output.display()))?;
            log::info!("Saved texture to {}", output.display());
        }

        Commands::FillHoles { input, output, passes } => {
            let mut texture =
                PixelImage::load(&input).with_context(|| format!("loading texture {}", input.display()))?;
            let filled = HoleFiller::fill(&mut texture, passes)?;
            texture.save(&output, TextureFormat::Auto)?;
            log::info!("Filled {} holes, saved to {}", filled, output.display());
        }

        Commands::Checkerboard { output, scan_size } => {
            let scan_size = scan_size.unwrap_or(config.scan.scan_depth);
            let board = PatternGenerator::checkerboard(config.scan.texture_size, scan_size, BLACK, WHITE);
            let path = output.unwrap_or_else(|| config.scan.texture_path.clone());
            board.save(&path, TextureFormat::Auto)?;
            log::info!("Saved checkerboard to {}", path.display());
        }

        Commands::TestTexture { output } => {
            let mut rng = rand::rng();
            let color = image::Rgba([rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>(), 255]);
            let size = 1 << config.scan.texture_size;
            let path = output.unwrap_or_else(|| config.scan.texture_path.clone());
            PatternGenerator::solid(size, color).save(&path, TextureFormat::Auto)?;
            log::info!("Saved test texture {:?} to {}", color.0, path.display());
        }

        Commands::InitConfig { path, force } => {
            let path = match path {
                Some(path) => path,
                None => ProjectConfig::default_path().context("no user config directory")?,
            };
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            ProjectConfig::default().save(&path)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ProjectConfig> {
    if let Some(path) = path {
        return ProjectConfig::load(path).with_context(|| format!("loading config {}", path.display()));
    }
    match ProjectConfig::default_path() {
        Some(path) if path.exists() => {
            ProjectConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
        }
        _ => Ok(ProjectConfig::default()),
    }
}

/// Sink that discards stimuli when they are not written out.
struct NullSink;

impl StimulusSink for NullSink {
    fn show(&mut self, _stimulus: &PixelImage) -> projexture::Result<()> {
        Ok(())
    }
}

fn scan_in_foreground(
    mut session: ScanSession,
    replay: ReplayCapture,
    sink: Option<FileStimulusSink>,
) -> anyhow::Result<ScanSession> {
    match sink {
        Some(sink) => ScanRunner::new(replay, sink).run_to_completion(&mut session)?,
        None => ScanRunner::new(replay, NullSink).run_to_completion(&mut session)?,
    }
    Ok(session)
}

fn scan_in_background(
    session: ScanSession,
    replay: ReplayCapture,
    mut sink: Option<FileStimulusSink>,
) -> anyhow::Result<ScanSession> {
    if let (Some(sink), Some(first)) = (sink.as_mut(), session.current_stimulus()) {
        sink.show(&first)?;
    }

    let worker = ScanWorker::spawn(session, replay);
    worker.request_step()?;

    loop {
        let Some(event) = worker.wait(Duration::from_secs(30))? else {
            bail!("timed out waiting for the scan worker");
        };
        match event {
            WorkerEvent::StepCompleted {
                state,
                progress,
                next_stimulus,
            } => {
                log::info!("Step {} of {} done, next: {}", progress.0, progress.1, state);
                if let (Some(sink), Some(stimulus)) = (sink.as_mut(), next_stimulus.as_ref()) {
                    sink.show(stimulus)?;
                }
                if !state.is_done() {
                    worker.request_step()?;
                }
            }
            WorkerEvent::Finished(_) => break,
            WorkerEvent::CaptureFailed(reason) => bail!("capture failed: {}", reason),
            WorkerEvent::IngestFailed(reason) => bail!("capture rejected: {}", reason),
        }
    }

    Ok(worker.finish()?)
}
