//! monovo CLI: run monocular visual odometry over a directory of frames.

mod cli;

use std::{collections::HashSet, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use monovo::{OdometryConfig, Presenter, System};

use cli::{
    capture::frame_paths,
    overlay::{LogPresenter, OverlayPresenter, Presenters},
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "monovo")]
#[command(about = "Frame-to-frame monocular visual odometry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track an ordered image sequence.
    Run(RunArgs),

    /// Print the default configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Directory of frames, processed in file name order.
    #[arg(long)]
    frames: PathBuf,

    /// Path to a JSON configuration. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write the trajectory (JSON).
    #[arg(long)]
    trajectory_out: Option<PathBuf>,

    /// Directory to write annotated frames to.
    #[arg(long)]
    save_frames: Option<PathBuf>,

    /// Reset the pose after these frame indices (1-based, comma separated).
    #[arg(long, value_delimiter = ',')]
    reset_at: Vec<u64>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::DefaultConfig => {
            println!("{}", OdometryConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run(args: &RunArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => OdometryConfig::from_json_file(path)?,
        None => OdometryConfig::default(),
    };

    let paths = frame_paths(&args.frames).map_err(|e| -> CliError {
        format!("Failed to list frames in {}: {}", args.frames.display(), e).into()
    })?;
    if paths.is_empty() {
        return Err(format!("no image files in {}", args.frames.display()).into());
    }
    tracing::info!("Tracking {} frames from {}", paths.len(), args.frames.display());

    let mut presenters: Vec<Box<dyn Presenter>> = vec![Box::new(LogPresenter)];
    if let Some(dir) = &args.save_frames {
        presenters.push(Box::new(OverlayPresenter::new(dir.clone())?));
    }
    let mut presenter = Presenters(presenters);

    let reset_at: HashSet<u64> = args.reset_at.iter().copied().collect();
    let mut system = System::new(&config)?;

    for path in &paths {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping unreadable frame");
                continue;
            }
        };

        let report = system.track_monocular_with(&image, &mut presenter);
        if reset_at.contains(&report.frame_index) {
            system.reset();
        }
    }

    if let Some(path) = &args.trajectory_out {
        system.tracker.trajectory().save_to_file(path)?;
        tracing::info!("Trajectory written to {}", path.display());
    }

    let summary = system.shutdown();
    println!("{summary}");
    Ok(())
}
