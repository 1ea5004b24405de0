//! Capability interface the copy engine uses to reach a storage backend
//!
//! A [`Provider`] turns a [`Locator`] into an open handle. Handles are released by consuming
//! them with `close`, so a handle can never be closed twice.

use crate::error::Error;
use crate::locator::Locator;

/// Readable side of a copy.
pub trait SourceHandle: std::io::Read {
    fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Writable side of a copy.
///
/// Closing is where a provider commits the object, so a failed `close` means the object may not
/// have been stored.
pub trait TargetHandle: std::io::Write {
    fn close(self: Box<Self>) -> anyhow::Result<()>;

    /// Releases the handle without storing the object; nothing written so far becomes visible.
    fn abort(self: Box<Self>) -> anyhow::Result<()>;
}

/// An opened source object together with the metadata the provider computed while opening it.
pub struct Source {
    pub handle: Box<dyn SourceHandle>,
    /// Declared object length in bytes, authoritative for the transfer.
    pub length: u64,
    /// Hex-encoded content digest.
    pub hash: String,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("length", &self.length)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

pub trait Provider {
    /// Resolves `locator`, checks that its bucket exists and opens the object for reading.
    ///
    /// # Errors
    /// [`Error::Resolution`], [`Error::Validation`] or [`Error::SourceRead`], all naming `locator`.
    fn acquire_source(&self, locator: &Locator) -> Result<Source, Error>;

    /// Resolves `locator`, checks that its bucket exists and opens the object for writing.
    ///
    /// `hash` and `length` describe the data that will be written and let the provider verify or
    /// pre-allocate.
    ///
    /// # Errors
    /// [`Error::Resolution`], [`Error::Validation`] or [`Error::TargetWrite`], all naming `locator`.
    fn acquire_target(
        &self,
        locator: &Locator,
        hash: &str,
        length: u64,
    ) -> Result<Box<dyn TargetHandle>, Error>;
}

/// Source handle that is released when dropped unless it was closed explicitly.
pub struct OpenSource {
    locator: Locator,
    handle: Option<Box<dyn SourceHandle>>,
}

impl OpenSource {
    #[must_use]
    pub fn new(locator: Locator, handle: Box<dyn SourceHandle>) -> Self {
        Self {
            locator,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Releases the handle.
    ///
    /// # Errors
    /// [`Error::Close`] if the provider fails to release it.
    pub fn close(mut self) -> Result<(), Error> {
        match self.handle.take() {
            Some(handle) => handle.close().map_err(|source| Error::Close {
                locator: self.locator.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl std::io::Read for OpenSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.handle.as_mut() {
            Some(handle) => handle.read(buf),
            None => Err(std::io::Error::other(format!(
                "{} is already closed",
                self.locator
            ))),
        }
    }
}

impl Drop for OpenSource {
    fn drop(&mut self) {
        if let Some(Err(error)) = self.handle.take().map(|handle| handle.close()) {
            tracing::warn!("failed releasing {}: {:#}", self.locator, error);
        }
    }
}
