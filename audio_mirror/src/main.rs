use anyhow::{Context, Result};
use audio_mirror::{
    plan_report, print_summary_report, AudioFormat, CancelFlag, ConversionRunner, FfmpegTranscoder,
    FormatSpec, LogRenderer, Renderer, RunConfig, SilentRenderer, SourceFilter, TerminalRenderer,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shared_utils::logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

const EXIT_FAILURES: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "audio-mirror")]
#[command(version, about = "Mirror an audio library into another format, converting only what is missing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory for log files (system temp dir by default).
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Echo debug logging to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every source file that has no counterpart in the destination.
    Convert {
        #[command(flatten)]
        target: TargetArgs,

        /// Simultaneous conversions (default: one per CPU).
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,

        /// Progress redraw interval in milliseconds.
        #[arg(long, default_value_t = 200)]
        render_interval_ms: u64,

        /// Print the run result as JSON instead of the summary box.
        #[arg(long)]
        json: bool,

        /// No progress display.
        #[arg(long)]
        quiet: bool,
    },

    /// Show what `convert` would do without converting anything.
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        /// Maximum number of pending files listed.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List the known target formats.
    Formats,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    #[arg(value_name = "DEST")]
    dest: PathBuf,

    /// Target format, e.g. opus, mp3, flac, vorbis.
    #[arg(short, long)]
    format: String,

    /// Encoder preset: a bitrate such as 128k, or a codec quality level.
    #[arg(short, long)]
    quality: Option<String>,

    /// Only consider files with a known audio extension as sources.
    #[arg(long)]
    audio_only: bool,

    /// Do not copy cover images (jpg, png, ...) into the destination.
    #[arg(long)]
    no_artwork: bool,
}

impl TargetArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let format = FormatSpec::parse(&self.format, self.quality.as_deref())
            .with_context(|| format!("Invalid target format '{}'", self.format))?;
        let filter = if self.audio_only {
            SourceFilter::AudioOnly
        } else {
            SourceFilter::AnyExceptTarget
        };
        Ok(RunConfig::new(&self.source, &self.dest, format)
            .with_filter(filter)
            .with_artwork(!self.no_artwork))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = console::Term::stderr().is_term();

    // Without a terminal the progress frames are log lines, so let INFO through.
    let stderr_level = match (cli.verbose, interactive) {
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
        (false, true) => Level::WARN,
    };
    let mut log_config = LogConfig::default()
        .with_targets(&["audio_mirror", "shared_utils"])
        .with_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_stderr_level(stderr_level);
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    if let Err(e) = init_logging("audio-mirror", log_config) {
        eprintln!("⚠️  Logging disabled: {:#}", e);
    }

    match cli.command {
        Commands::Convert {
            target,
            parallelism,
            render_interval_ms,
            json,
            quiet,
        } => {
            let allocation = shared_utils::allocate(parallelism);
            let config = target
                .run_config()?
                .with_parallelism(parallelism.unwrap_or(allocation.parallel_tasks))
                .with_render_interval(Duration::from_millis(render_interval_ms));

            let transcoder = FfmpegTranscoder::locate(allocation.child_threads)?;
            let renderer: Box<dyn Renderer> = if json || quiet {
                Box::new(SilentRenderer)
            } else if interactive {
                Box::new(TerminalRenderer::new(config.parallelism))
            } else {
                Box::new(LogRenderer::new())
            };

            let cancel = CancelFlag::new();
            install_interrupt_handler(cancel.clone())?;

            info!(
                source = %config.source_root.display(),
                dest = %config.dest_root.display(),
                format = %config.format,
                "audio-mirror convert"
            );

            let result = ConversionRunner::new(config, &transcoder, renderer.as_ref())
                .with_cancel(cancel)
                .run()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.total_tasks == 0 {
                println!(
                    "✅ Nothing to convert ({} files already up to date)",
                    result.skipped
                );
            } else {
                print_summary_report(&result, "Conversion");
            }

            if result.was_interrupted() {
                std::process::exit(EXIT_INTERRUPTED);
            }
            if !result.failures.is_empty() {
                std::process::exit(EXIT_FAILURES);
            }
        }

        Commands::Plan {
            target,
            limit,
            json: as_json,
        } => {
            let config = target.run_config()?;
            let transcoder = FfmpegTranscoder::locate(1)?;
            let renderer = SilentRenderer;
            let diff = ConversionRunner::new(config, &transcoder, &renderer).plan()?;

            if as_json {
                let output = json!({
                    "tasks": diff.tasks,
                    "already_converted": diff.already_converted,
                    "in_target_format": diff.in_target_format,
                    "collisions": diff.collisions,
                    "warnings": diff.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", plan_report(&diff, limit));
            }
        }

        Commands::Formats => {
            for format in AudioFormat::MODELLED {
                println!("{:<10} .{}", format.name(), format.extension());
            }
            println!("Other names are passed to ffmpeg as container formats.");
        }
    }

    Ok(())
}

/// First Ctrl-C stops dispatching new conversions; a second one exits at once,
/// leaving any `.part` files for the next run to sweep.
fn install_interrupt_handler(cancel: CancelFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(EXIT_INTERRUPTED);
        }
        cancel.cancel();
        eprintln!("\n⏸️  Interrupted: finishing running conversions (Ctrl-C again to abort)");
    })
    .context("Failed to install Ctrl-C handler")
}
