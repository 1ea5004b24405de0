use tracing::instrument;

use crate::error::Error;
use crate::locator::Locator;
use crate::provider::{Provider, TargetHandle};

/// A target handle together with the locator it writes to.
pub struct OpenTarget {
    pub locator: Locator,
    pub handle: Box<dyn TargetHandle>,
}

/// Complete, ordered set of open targets.
///
/// Any target still open when the set is dropped gets discarded, with failures only logged. Use
/// [`Targets::close_all`] or [`Targets::abort_all`] to observe release errors.
pub struct Targets {
    open: Vec<OpenTarget>,
}

impl Targets {
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn as_mut_slice(&mut self) -> &mut [OpenTarget] {
        &mut self.open
    }

    /// Closes every target in acquisition order, committing what was written.
    ///
    /// All targets are closed even if some fail; every failure is logged and the last one is
    /// returned.
    ///
    /// # Errors
    /// [`Error::Close`] for the last target that failed to close.
    pub fn close_all(self) -> Result<(), Error> {
        self.release("closing", |handle| handle.close())
    }

    /// Discards every target in acquisition order; none of them is stored.
    ///
    /// # Errors
    /// [`Error::Close`] for the last target that failed to release.
    pub fn abort_all(self) -> Result<(), Error> {
        self.release("discarding", |handle| handle.abort())
    }

    fn release<F>(mut self, action: &str, mut release: F) -> Result<(), Error>
    where
        F: FnMut(Box<dyn TargetHandle>) -> anyhow::Result<()>,
    {
        let mut result = Ok(());
        for target in std::mem::take(&mut self.open) {
            tracing::debug!("{} {}", action, target.locator);
            if let Err(source) = release(target.handle) {
                tracing::error!("failed {} {}: {:#}", action, target.locator, source);
                result = Err(Error::Close {
                    locator: target.locator,
                    source,
                });
            }
        }
        result
    }
}

impl Drop for Targets {
    fn drop(&mut self) {
        for target in std::mem::take(&mut self.open) {
            if let Err(error) = target.handle.abort() {
                tracing::warn!("failed discarding {}: {:#}", target.locator, error);
            }
        }
    }
}

/// Opens one target per locator, in order, primed with the source `hash` and `length`.
///
/// Either every target is opened or none stays open: on the first failure the targets opened so
/// far are discarded (release failures are only logged) and the acquisition error is returned.
///
/// # Errors
/// The error of the first target that could not be acquired; it names that target's locator.
#[instrument(skip(provider))]
pub fn acquire_targets(
    provider: &dyn Provider,
    locators: &[Locator],
    hash: &str,
    length: u64,
) -> Result<Targets, Error> {
    let mut targets = Targets {
        open: Vec::with_capacity(locators.len()),
    };
    for locator in locators {
        match provider.acquire_target(locator, hash, length) {
            Ok(handle) => {
                tracing::debug!("opened {} for writing", locator);
                targets.open.push(OpenTarget {
                    locator: locator.clone(),
                    handle,
                });
            }
            Err(error) => {
                tracing::debug!(
                    "failed opening {}, closing {} already open target(s)",
                    locator,
                    targets.len()
                );
                // dropping the partial set discards it
                drop(targets);
                return Err(error);
            }
        }
    }
    Ok(targets)
}
