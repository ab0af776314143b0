use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use sharpsheet::{
    ContactSheet, FailurePolicy, FfmpegCapture, MediaInfo, OperationType, ProgressCallback,
    ProgressInfo, SelectionOptions, SharpFrameSelector, SheetOptions, format_timestamp,
};

const CLI_AFTER_HELP: &str = "Examples:\n  sharpsheet movie.mkv\n  sharpsheet movie.mkv -o sheet.png --samples 40 --groups 6 --selected 4 --progress\n  sharpsheet movie.mkv --columns 3 --width 320 --json\n  sharpsheet completions zsh > _sharpsheet";

#[derive(Debug, Parser)]
#[command(
    name = "sharpsheet",
    version,
    about = "Build a contact sheet from the sharpest frames of a video",
    after_help = CLI_AFTER_HELP,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    sheet: SheetArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Parser, Clone)]
struct SheetArgs {
    /// Input video file.
    input: Option<PathBuf>,

    /// Output image path (defaults to <input>.png).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of candidate timestamps to sample.
    #[arg(long, default_value_t = 21)]
    samples: usize,

    /// Number of timeline groups; one candidate is kept per group.
    #[arg(long, default_value_t = 4)]
    groups: usize,

    /// Number of frames on the sheet.
    #[arg(long, default_value_t = 3)]
    selected: usize,

    /// Seconds to skip at the start of the video.
    #[arg(long, default_value_t = 5.0)]
    start_delay: f64,

    /// Seconds to skip at the end of the video.
    #[arg(long, default_value_t = 5.0)]
    end_delay: f64,

    /// Frame width in pixels (height follows the aspect ratio unless given).
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Frames per row on the sheet.
    #[arg(long, default_value_t = 1)]
    columns: u32,

    /// Gap between frames in pixels.
    #[arg(long, default_value_t = 5)]
    spacing: u32,

    /// Fraction of the frequency spectrum used by the sharpness metric.
    #[arg(long, default_value_t = 0.05)]
    quantile: f64,

    /// Time limit for capturing one frame, in seconds.
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Fail if any timestamp cannot be captured instead of skipping it.
    #[arg(long)]
    strict: bool,

    /// Capture frames on this many worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Path or name of the ffmpeg binary.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: OsString,

    /// Path or name of the ffprobe binary.
    #[arg(long, default_value = "ffprobe")]
    ffprobe: String,

    /// Print the result as machine-readable JSON.
    #[arg(long)]
    json: bool,

    /// Show a progress bar while sampling.
    #[arg(long)]
    progress: bool,

    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".png");
    PathBuf::from(name)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

fn selection_options(args: &SheetArgs) -> Result<SelectionOptions, Box<dyn std::error::Error>> {
    let timeout = Duration::try_from_secs_f64(args.timeout)
        .map_err(|_| format!("invalid --timeout: {}", args.timeout))?;

    let mut options = SelectionOptions::new()
        .with_samples(args.samples)
        .with_groups(args.groups)
        .with_selected(args.selected)
        .with_delays(args.start_delay, args.end_delay)
        .with_frame_size(args.width, args.height)
        .with_top_quantile(args.quantile)
        .with_extraction_timeout(timeout);

    if args.strict {
        options = options.with_failure_policy(FailurePolicy::Abort);
    }

    if let Some(threads) = args.threads {
        if cfg!(feature = "rayon") {
            options = options.with_threads(threads);
        } else {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                "--threads requires building with the `rayon` feature".yellow()
            );
        }
    }

    options.validate()?;
    Ok(options)
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.operation {
            OperationType::FrameSampling => {
                if let Some(total) = info.total {
                    self.bar.set_length(total);
                }
                self.bar.set_position(info.current);
                if let Some(offset) = info.current_offset {
                    self.bar.set_message(format_timestamp(offset as f64));
                }
            }
            OperationType::Selection => self.bar.set_message("selecting"),
            _ => {}
        }
    }
}

/// Header lines describing the input, dimensions as stored in the stream.
fn header_fields(media: &MediaInfo) -> [(&'static str, String); 4] {
    [
        ("File:", media.filename.clone()),
        ("Size:", media.human_readable_size()),
        ("Duration:", media.display_duration()),
        (
            "Dimensions:",
            format!("{}x{}", media.sample_width, media.sample_height),
        ),
    ]
}

fn print_header(media: &MediaInfo) {
    for (label, value) in header_fields(media) {
        println!("{} {value}", label.bold());
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "sharpsheet", &mut std::io::stdout());
        return Ok(());
    }

    let args = cli.sheet;
    init_logging(args.verbose);

    let input = args
        .input
        .clone()
        .ok_or("missing input file (see --help)")?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));
    ensure_writable_path(&output, args.overwrite)?;

    let mut options = selection_options(&args)?;
    let media = MediaInfo::probe_with(&args.ffprobe, &input)?;
    if !args.json {
        print_header(&media);
    }

    let progress = if args.progress {
        let progress = Arc::new(TerminalProgress::new(args.samples as u64)?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let capture = FfmpegCapture::new(&media.path).with_program(args.ffmpeg.clone());
    let selection = SharpFrameSelector::new(options).select(&media, &capture);

    if let Some(progress) = &progress {
        progress.bar.finish_and_clear();
    }
    let selection = selection?;

    let layout = SheetOptions::new()
        .with_columns(args.columns)
        .with_spacing(args.spacing);
    let sheet = ContactSheet::new(layout).compose(&selection.frames)?;
    sheet.save(&output)?;

    if args.json {
        let payload = json!({
            "file": media.filename,
            "path": media.path.display().to_string(),
            "duration_seconds": media.duration_seconds,
            "duration": media.display_duration(),
            "size_bytes": media.size_bytes,
            "display_width": media.display_width,
            "display_height": media.display_height,
            "sampled": selection.sampled,
            "failed": selection.failed,
            "output": output.display().to_string(),
            "frames": selection.frames.iter().map(|frame| json!({
                "timestamp": frame.timestamp.display,
                "offset_seconds": frame.timestamp.offset_seconds,
                "score": frame.score,
                "width": frame.image.width(),
                "height": frame.image.height(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if args.verbose {
        for frame in &selection.frames {
            eprintln!("selected {} (score {:.6})", frame.timestamp, frame.score);
        }
    }
    if selection.failed > 0 {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("{} timestamp(s) could not be captured", selection.failed).yellow()
        );
    }
    println!(
        "{} {}",
        "success:".green().bold(),
        format!(
            "Saved {} frame(s) from {} sample(s) to {}",
            selection.len(),
            selection.sampled,
            output.display()
        )
        .green()
    );

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
