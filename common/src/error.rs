use crate::locator::Locator;

/// Failures of the copy pipeline, each tagged with the locator that caused it.
///
/// # Logging Convention
/// Sources are `anyhow` chains, log with `{:#}` to see all of them:
/// ```ignore
/// tracing::error!("copy failed: {:#}", anyhow::Error::from(error));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider could not build a client for the locator.
    #[error("cannot resolve {locator}")]
    Resolution {
        locator: Locator,
        #[source]
        source: anyhow::Error,
    },
    /// The bucket referenced by the locator does not exist or is inaccessible.
    #[error("bucket '{}' of {locator} is not accessible", .locator.bucket())]
    Validation {
        locator: Locator,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot open {locator} for reading")]
    SourceRead {
        locator: Locator,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot open {locator} for writing")]
    TargetWrite {
        locator: Locator,
        #[source]
        source: anyhow::Error,
    },
    /// The bounded transfer failed on either side, `locator` names the failing one.
    #[error("transfer failed at {locator} after {copied} of {expected} bytes")]
    Stream {
        locator: Locator,
        copied: u64,
        expected: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot close {locator}")]
    Close {
        locator: Locator,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    #[must_use]
    pub fn locator(&self) -> &Locator {
        match self {
            Error::Resolution { locator, .. }
            | Error::Validation { locator, .. }
            | Error::SourceRead { locator, .. }
            | Error::TargetWrite { locator, .. }
            | Error::Stream { locator, .. }
            | Error::Close { locator, .. } => locator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_names_locator_and_cause() {
        let error = Error::Validation {
            locator: Locator::new("d2", "obj"),
            source: anyhow::anyhow!("no such bucket"),
        };
        assert_eq!(error.locator(), &Locator::new("d2", "obj"));
        let chain = format!("{:#}", anyhow::Error::from(error));
        assert!(chain.contains("d2/obj"));
        assert!(chain.contains("no such bucket"));
    }

    #[test]
    fn stream_error_reports_progress() {
        let error = Error::Stream {
            locator: Locator::new("src", "obj"),
            copied: 512,
            expected: 1024,
            source: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
        };
        assert_eq!(
            error.to_string(),
            "transfer failed at src/obj after 512 of 1024 bytes"
        );
    }
}
