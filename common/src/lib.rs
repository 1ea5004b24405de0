//! Common utilities and types for the ocp tools
//!
//! This crate holds the copy engine behind `ocp`: a single source object is streamed into any
//! number of target objects in one pass, with optional progress reporting.
//!
//! # Core Modules
//!
//! - [`copy`](mod@copy) - Single source to many targets copy with user-facing error messages
//! - [`targets`] - All-or-nothing acquisition of target handles
//! - [`fanout`] - Writer duplicating every chunk to all targets and the progress sink
//! - [`provider`] - Storage traits implemented by backends
//! - [`fs`] - Storage provider backed by a local directory tree
//! - [`progress`] - Progress bar and text update display
//!
//! # Error Reporting
//!
//! A failed copy reports one short message to the user, for example
//! `Unable to write to target`, while the diagnostic cause is only printed with `--debug` or
//! logged at DEBUG level.

use std::fmt::Display;

pub mod config;
pub mod copy;
pub mod error;
pub mod fanout;
pub mod fs;
pub mod locator;
pub mod progress;
pub mod provider;
pub mod targets;

#[cfg(test)]
pub mod testutils;

pub use config::OutputConfig;
pub use copy::copy;
pub use error::Error;
pub use fs::FsProvider;
pub use locator::Locator;
pub use progress::{ProgressSettings, ProgressType, parse_progress_delay};
pub use provider::Provider;

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_level()));
    // a subscriber may already be installed, e.g. by tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Message shown to the user for a failed run.
///
/// Copy failures carry their own short message; anything else is shown with its whole chain.
#[must_use]
pub fn error_message(error: &anyhow::Error) -> String {
    let message = match error.downcast_ref::<copy::Error>() {
        Some(copy_error) => copy_error.message().to_string(),
        None => format!("{error:#}"),
    };
    if message.is_empty() {
        copy::NO_MESSAGE.to_string()
    } else {
        message
    }
}

/// Sets up logging, runs `func` and reports its outcome.
///
/// Returns `None` if `func` failed; the caller is expected to exit with a non-zero status.
pub fn run<Summary, Func>(output: OutputConfig, func: Func) -> Option<Summary>
where
    Summary: Display,
    Func: FnOnce() -> anyhow::Result<Summary>,
{
    init_tracing(&output);
    match func() {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::debug!("{:#}", error);
            eprintln!("ocp: {}", error_message(&error));
            if output.debug {
                eprintln!("{error:?}");
            }
            let summary = error
                .downcast_ref::<copy::Error>()
                .map(|copy_error| copy_error.summary);
            if let Some(summary) = summary.filter(|_| output.print_summary || output.verbose > 0) {
                eprintln!("{summary}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_errors_show_only_their_message() {
        let failure = Error::Close {
            locator: Locator::new("d1", "obj"),
            source: anyhow::anyhow!("connection reset"),
        };
        let error = anyhow::Error::from(copy::Error::new(
            copy::UNABLE_TO_CLOSE,
            failure,
            copy::Summary::default(),
        ));
        assert_eq!(error_message(&error), copy::UNABLE_TO_CLOSE);
        // the cause is still in the chain for debug output
        assert!(format!("{error:#}").contains("connection reset"));
    }

    #[test]
    fn empty_messages_fall_back() {
        let failure = Error::Close {
            locator: Locator::new("d1", "obj"),
            source: anyhow::anyhow!("connection reset"),
        };
        let error = anyhow::Error::from(copy::Error::new("", failure, copy::Summary::default()));
        assert_eq!(error_message(&error), copy::NO_MESSAGE);
        assert_eq!(error_message(&anyhow::anyhow!("")), copy::NO_MESSAGE);
    }

    #[test]
    fn other_errors_show_their_chain() {
        let error = anyhow::anyhow!("\"d1\" is not of the form bucket/key").context("invalid target");
        assert_eq!(
            error_message(&error),
            "invalid target: \"d1\" is not of the form bucket/key"
        );
    }

    #[test]
    fn run_returns_none_on_failure() {
        let output = OutputConfig::default();
        assert!(run(output, || -> anyhow::Result<u64> { Err(anyhow::anyhow!("boom")) }).is_none());
        assert_eq!(run(output, || anyhow::Ok(7u64)), Some(7));
    }
}
