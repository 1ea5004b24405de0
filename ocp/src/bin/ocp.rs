use anyhow::anyhow;
use clap::Parser;
use tracing::instrument;

use ocp_tools_ocp::path;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ocp",
    version,
    about = "Copy one object to many targets in a single pass",
    long_about = "`ocp` copies a single object into one or more target objects. The source is read once and every chunk is written to all targets.

Objects are addressed as `bucket/key`; with the filesystem provider a bucket is a directory under --root.

EXAMPLES:
    # Copy to two buckets with a summary
    ocp --root /srv/store src/data.bin backup1/data.bin backup2/data.bin --summary

    # Quiet copy, no progress output
    ocp -q src/data.bin mirror/data.bin

    # Show the full error cause on failure
    ocp --debug src/data.bin mirror/data.bin"
)]
struct Args {
    // Copy options
    /// Storage root; each bucket is a directory directly below it
    #[arg(
        long,
        default_value = ".",
        value_name = "DIR",
        help_heading = "Copy options"
    )]
    root: std::path::PathBuf,

    /// Copy every object under a prefix (not supported)
    #[arg(short, long, help_heading = "Copy options")]
    recursive: bool,

    /// Size of the chunks read from the source and written to every target
    #[arg(
        long,
        default_value = "128KiB",
        value_name = "SIZE",
        help_heading = "Copy options"
    )]
    chunk_size: bytesize::ByteSize,

    // Progress & output
    /// Quiet mode, don't show progress
    ///
    /// Errors are still reported.
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Set the type of progress display
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Set delay between progress updates
    ///
    /// Default is 200ms for interactive mode (`ProgressBar`) and 10s for non-interactive mode (`TextUpdates`). Accepts human-readable durations like "200ms", "10s", "5min".
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print the full cause of errors and log at DEBUG level
    #[arg(long, help_heading = "Progress & output")]
    debug: bool,

    // ARGUMENTS
    /// Source object followed by one or more target objects, as bucket/key
    #[arg(value_name = "LOCATOR")]
    paths: Vec<String>,
}

fn settings(args: &Args) -> anyhow::Result<common::copy::Settings> {
    let progress = if args.quiet {
        None
    } else {
        let progress_delay = args
            .progress_delay
            .as_deref()
            .map(common::parse_progress_delay)
            .transpose()?;
        Some(common::ProgressSettings {
            progress_type: args.progress_type.unwrap_or_default(),
            progress_delay,
        })
    };
    let settings = common::copy::Settings {
        progress,
        chunk_size: args.chunk_size.0,
    };
    settings
        .validate()
        .map_err(|error| anyhow!("invalid settings: {error}"))?;
    Ok(settings)
}

#[instrument]
fn run_copy(args: Args) -> anyhow::Result<common::copy::Summary> {
    if args.recursive {
        return Err(anyhow!("Recursive copy is not supported"));
    }
    let (source, targets) = path::parse_locators(&args.paths)?;
    let settings = settings(&args)?;
    let provider = common::FsProvider::new(&args.root);
    tracing::debug!("copying {} to {} target(s)", source, targets.len());
    let summary = common::copy(&provider, &source, &targets, &settings)?;
    Ok(summary)
}

fn main() {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || run_copy(args)
    };
    let output = common::OutputConfig {
        verbose: args.verbose,
        debug: args.debug,
        print_summary: args.summary,
    };
    if common::run(output, func).is_none() {
        std::process::exit(1);
    }
}
