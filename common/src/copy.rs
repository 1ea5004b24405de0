use std::io::{Read, Write};

use tracing::instrument;

use crate::error::Error as CopyFailure;
use crate::fanout::FanOut;
use crate::locator::Locator;
use crate::progress::{ProgressSettings, ProgressSink};
use crate::provider::{OpenSource, Provider};
use crate::targets::acquire_targets;

pub const UNABLE_TO_READ: &str = "Unable to read from source";
pub const UNABLE_TO_WRITE: &str = "Unable to write to target";
pub const UNABLE_TO_CLOSE: &str = "Unable to close all connections, write may have failed";
pub const NO_MESSAGE: &str = "No error message present, please rerun with --debug and report a bug.";

pub const DEFAULT_CHUNK_SIZE: u64 = 128 * 1024;

/// Error type for copy operations: a short message for the user, the diagnostic cause and the
/// summary of what was done before failing.
///
/// Display shows only the message; log the diagnostic chain with `{:#}` on `anyhow::Error`:
/// ```ignore
/// tracing::debug!("{:#}", anyhow::Error::from(error));
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{}", non_empty(.message))]
pub struct Error {
    message: String,
    #[source]
    pub source: CopyFailure,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(message: impl Into<String>, source: CopyFailure, summary: Summary) -> Self {
        Error {
            message: message.into(),
            source,
            summary,
        }
    }

    /// Human-readable one-line summary of the failure, never empty.
    #[must_use]
    pub fn message(&self) -> &str {
        non_empty(&self.message)
    }
}

fn non_empty(message: &str) -> &str {
    if message.is_empty() {
        NO_MESSAGE
    } else {
        message
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` means quiet: no progress sink is created.
    pub progress: Option<ProgressSettings>,
    pub chunk_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress: Some(ProgressSettings::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Settings {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(format!("chunk_size {} is too large", self.chunk_size));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub targets_written: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            targets written: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.targets_written,
        )
    }
}

/// Copies exactly `length` bytes from `source` into `fanout`, reading at most `chunk_size` bytes
/// at a time.
///
/// Returns the number of bytes copied together with the failure, if any.
fn copy_exact(
    source: &mut OpenSource,
    fanout: &mut FanOut<'_>,
    length: u64,
    chunk_size: u64,
) -> (u64, Result<(), CopyFailure>) {
    // chunk_size is validated to fit in usize
    let mut buffer = vec![0u8; chunk_size.min(length).max(1) as usize];
    let mut copied = 0u64;
    while copied < length {
        let want = (length - copied).min(buffer.len() as u64) as usize;
        let read = match source.read(&mut buffer[..want]) {
            Ok(0) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("source ended after {copied} of {length} bytes"),
            )),
            Ok(read) => Ok(read),
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => Err(error),
        };
        let read = match read {
            Ok(read) => read,
            Err(source_error) => {
                return (
                    copied,
                    Err(CopyFailure::Stream {
                        locator: source.locator().clone(),
                        copied,
                        expected: length,
                        source: source_error,
                    }),
                );
            }
        };
        if let Err(write_error) = fanout.write_all(&buffer[..read]) {
            let locator = fanout
                .failed_target()
                .map_or_else(|| source.locator().clone(), |target| target.locator.clone());
            return (
                copied,
                Err(CopyFailure::Stream {
                    locator,
                    copied,
                    expected: length,
                    source: write_error,
                }),
            );
        }
        copied += read as u64;
    }
    if let Err(flush_error) = fanout.flush() {
        let locator = fanout
            .failed_target()
            .map_or_else(|| source.locator().clone(), |target| target.locator.clone());
        return (
            copied,
            Err(CopyFailure::Stream {
                locator,
                copied,
                expected: length,
                source: flush_error,
            }),
        );
    }
    (copied, Ok(()))
}

/// Copies the object at `source` to every locator in `targets`.
///
/// The source is opened first and its length and hash are handed to every target. Targets are
/// opened all-or-nothing, then exactly the declared length is streamed to all of them (and to the
/// progress display unless quiet). Every handle that was opened is released before returning,
/// whatever the outcome; targets are only committed when the whole object was streamed.
///
/// # Errors
/// A [`struct@Error`] whose message says which phase failed and whose source names the locator
/// responsible.
#[instrument(skip(provider))]
pub fn copy(
    provider: &dyn Provider,
    source: &Locator,
    targets: &[Locator],
    settings: &Settings,
) -> Result<Summary, Error> {
    tracing::debug!("opening source");
    let acquired = provider
        .acquire_source(source)
        .map_err(|err| Error::new(UNABLE_TO_READ, err, Summary::default()))?;
    let length = acquired.length;
    let hash = acquired.hash;
    let mut reader = OpenSource::new(source.clone(), acquired.handle);
    tracing::debug!("source is {} bytes, hash {}", length, hash);
    let mut open_targets = match acquire_targets(provider, targets, &hash, length) {
        Ok(open_targets) => open_targets,
        Err(err) => {
            if let Err(close_error) = reader.close() {
                tracing::warn!("{:#}", anyhow::Error::from(close_error));
            }
            return Err(Error::new(UNABLE_TO_WRITE, err, Summary::default()));
        }
    };
    let mut progress = settings
        .progress
        .as_ref()
        .map(|progress| ProgressSink::new(&source.to_string(), length, progress));
    tracing::debug!("streaming {} bytes to {} target(s)", length, open_targets.len());
    let (copied, stream_result) = {
        let mut fanout = FanOut::new(open_targets.as_mut_slice(), progress.as_mut());
        copy_exact(&mut reader, &mut fanout, length, settings.chunk_size)
    };
    if let Some(progress) = progress {
        progress.finish();
    }
    let targets_written = open_targets.len();
    tracing::debug!("closing {} target(s) and the source", targets_written);
    // a target is only committed when all bytes reached every target
    let mut close_result = if stream_result.is_ok() {
        open_targets.close_all()
    } else {
        open_targets.abort_all()
    };
    if let Err(close_error) = reader.close() {
        match std::error::Error::source(&close_error) {
            Some(cause) => tracing::error!("{}: {}", close_error, cause),
            None => tracing::error!("{}", close_error),
        }
        close_result = Err(close_error);
    }
    let summary = Summary {
        bytes_copied: copied,
        targets_written: if stream_result.is_ok() && close_result.is_ok() {
            targets_written
        } else {
            0
        },
    };
    match (stream_result, close_result) {
        (Ok(()), Ok(())) => Ok(summary),
        (Err(stream_error), Ok(())) => {
            Err(Error::new(stream_error.to_string(), stream_error, summary))
        }
        (Err(stream_error), Err(close_error)) => {
            tracing::debug!(
                "close also failed after streaming error: {:#}",
                anyhow::Error::from(close_error)
            );
            Err(Error::new(UNABLE_TO_CLOSE, stream_error, summary))
        }
        (Ok(()), Err(close_error)) => Err(Error::new(UNABLE_TO_CLOSE, close_error, summary)),
    }
}
