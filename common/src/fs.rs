//! Filesystem-backed object storage
//!
//! Buckets are directories directly under a root directory and objects are files inside them,
//! keyed by their relative path. Targets are written to a hidden partial file and renamed into
//! place on close, only after the byte count and SHA-256 digest match what the source declared,
//! so an interrupted copy never leaves a truncated object behind.

use std::io::{Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, anyhow};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::Error;
use crate::locator::Locator;
use crate::provider::{Provider, Source, SourceHandle, TargetHandle};

#[derive(Debug, Clone)]
pub struct FsProvider {
    root: PathBuf,
}

impl FsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Checks the root and the bucket, returning the bucket directory.
    fn bucket_dir(&self, locator: &Locator) -> Result<PathBuf, Error> {
        let root_metadata = std::fs::metadata(&self.root)
            .with_context(|| format!("failed reading metadata from {:?}", &self.root))
            .map_err(|source| Error::Resolution {
                locator: locator.clone(),
                source,
            })?;
        if !root_metadata.is_dir() {
            return Err(Error::Resolution {
                locator: locator.clone(),
                source: anyhow!("storage root {:?} is not a directory", &self.root),
            });
        }
        let validate = || -> anyhow::Result<PathBuf> {
            let bucket = locator.bucket();
            if bucket.is_empty()
                || !matches!(
                    Path::new(bucket).components().collect::<Vec<_>>().as_slice(),
                    [Component::Normal(_)]
                )
            {
                return Err(anyhow!("invalid bucket name {:?}", bucket));
            }
            let bucket_dir = self.root.join(bucket);
            let metadata = std::fs::metadata(&bucket_dir)
                .with_context(|| format!("bucket {bucket:?} does not exist"))?;
            if !metadata.is_dir() {
                return Err(anyhow!("bucket {:?} is not a directory", bucket));
            }
            Ok(bucket_dir)
        };
        validate().map_err(|source| Error::Validation {
            locator: locator.clone(),
            source,
        })
    }
}

/// Maps an object key onto a path inside `bucket_dir`, rejecting anything that could escape it.
fn object_path(bucket_dir: &Path, key: &str) -> anyhow::Result<PathBuf> {
    if key.is_empty() || key.ends_with('/') {
        return Err(anyhow!("invalid object key {:?}", key));
    }
    // components() folds "a/./b" and "a//b" into "a/b", so distinct keys would share a file
    let relative = Path::new(key);
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(anyhow!(
            "object key {:?} must be a relative path without empty, '.' or '..' segments",
            key
        ));
    }
    Ok(bucket_dir.join(relative))
}

/// Creates the missing parents of `path`, returning the created directories deepest first.
fn create_parents(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current.exists() {
            break;
        }
        missing.push(current.to_path_buf());
        dir = current.parent();
    }
    if let Some(parent) = missing.first() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {parent:?}"))?;
    }
    Ok(missing)
}

/// Removes the partial file and the directories created for it.
///
/// Directories that are no longer empty, e.g. shared with another target, are left in place.
fn discard(partial: &Path, created_dirs: &[PathBuf]) -> anyhow::Result<()> {
    std::fs::remove_file(partial).with_context(|| format!("failed removing {partial:?}"))?;
    for dir in created_dirs {
        if let Err(error) = std::fs::remove_dir(dir) {
            tracing::debug!("leaving {:?} in place: {}", dir, error);
            break;
        }
    }
    Ok(())
}

fn partial_path(path: &Path) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .with_context(|| format!("{path:?} has no file name"))?;
    Ok(path.with_file_name(format!(
        ".{}.{}.partial",
        name.to_string_lossy(),
        std::process::id()
    )))
}

impl Provider for FsProvider {
    #[instrument(skip(self))]
    fn acquire_source(&self, locator: &Locator) -> Result<Source, Error> {
        let bucket_dir = self.bucket_dir(locator)?;
        let open = || -> anyhow::Result<Source> {
            let path = object_path(&bucket_dir, locator.key())?;
            let mut file = std::fs::File::open(&path)
                .with_context(|| format!("cannot open {:?} for reading", &path))?;
            let metadata = file
                .metadata()
                .with_context(|| format!("failed reading metadata from {:?}", &path))?;
            if !metadata.is_file() {
                return Err(anyhow!("{:?} is not a file", &path));
            }
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)
                .with_context(|| format!("failed hashing {:?}", &path))?;
            file.rewind()
                .with_context(|| format!("failed rewinding {:?}", &path))?;
            let hash = hex::encode(hasher.finalize());
            tracing::debug!("{:?}: {} bytes, sha256 {}", &path, metadata.len(), &hash);
            Ok(Source {
                handle: Box::new(FsSource {
                    reader: std::io::BufReader::new(file),
                }),
                length: metadata.len(),
                hash,
            })
        };
        open().map_err(|source| Error::SourceRead {
            locator: locator.clone(),
            source,
        })
    }

    #[instrument(skip(self))]
    fn acquire_target(
        &self,
        locator: &Locator,
        hash: &str,
        length: u64,
    ) -> Result<Box<dyn TargetHandle>, Error> {
        let bucket_dir = self.bucket_dir(locator)?;
        let open = || -> anyhow::Result<Box<dyn TargetHandle>> {
            let path = object_path(&bucket_dir, locator.key())?;
            if path.is_dir() {
                return Err(anyhow!("{:?} is a directory", &path));
            }
            let partial = partial_path(&path)?;
            let created_dirs = create_parents(&path)?;
            let file = match std::fs::File::create(&partial) {
                Ok(file) => file,
                Err(error) => {
                    for dir in &created_dirs {
                        let _ = std::fs::remove_dir(dir);
                    }
                    return Err(error)
                        .with_context(|| format!("cannot open {:?} for writing", &partial));
                }
            };
            tracing::debug!("writing {:?} through {:?}", &path, &partial);
            Ok(Box::new(FsTarget {
                path,
                partial,
                created_dirs,
                writer: std::io::BufWriter::new(file),
                hasher: Sha256::new(),
                written: 0,
                expected_hash: hash.to_ascii_lowercase(),
                expected_length: length,
            }))
        };
        open().map_err(|source| Error::TargetWrite {
            locator: locator.clone(),
            source,
        })
    }
}

struct FsSource {
    reader: std::io::BufReader<std::fs::File>,
}

impl Read for FsSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl SourceHandle for FsSource {
    fn close(self: Box<Self>) -> anyhow::Result<()> {
        // nothing to flush, dropping the file releases it
        Ok(())
    }
}

struct FsTarget {
    path: PathBuf,
    partial: PathBuf,
    /// Parent directories created on acquisition, deepest first.
    created_dirs: Vec<PathBuf>,
    writer: std::io::BufWriter<std::fs::File>,
    hasher: Sha256,
    written: u64,
    expected_hash: String,
    expected_length: u64,
}

impl FsTarget {
    fn commit(self) -> anyhow::Result<()> {
        let file = self
            .writer
            .into_inner()
            .map_err(|err| err.into_error())
            .with_context(|| format!("failed flushing {:?}", &self.partial))?;
        file.sync_all()
            .with_context(|| format!("failed syncing {:?}", &self.partial))?;
        drop(file);
        if self.written != self.expected_length {
            return Err(anyhow!(
                "received {} of {} bytes",
                self.written,
                self.expected_length
            ));
        }
        let actual_hash = hex::encode(self.hasher.finalize());
        if !self.expected_hash.is_empty() && actual_hash != self.expected_hash {
            return Err(anyhow!(
                "content hash mismatch: expected {}, got {}",
                self.expected_hash,
                actual_hash
            ));
        }
        std::fs::rename(&self.partial, &self.path)
            .with_context(|| format!("failed renaming {:?} to {:?}", &self.partial, &self.path))
    }
}

impl Write for FsTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl TargetHandle for FsTarget {
    fn close(self: Box<Self>) -> anyhow::Result<()> {
        let partial = self.partial.clone();
        let path = self.path.clone();
        let created_dirs = self.created_dirs.clone();
        match self.commit() {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(discard_error) = discard(&partial, &created_dirs) {
                    tracing::warn!("{:#}", discard_error);
                }
                Err(error.context(format!("{path:?} was not stored")))
            }
        }
    }

    fn abort(self: Box<Self>) -> anyhow::Result<()> {
        let FsTarget {
            partial,
            created_dirs,
            writer,
            ..
        } = *self;
        // buffered bytes are dropped unwritten
        let (file, _) = writer.into_parts();
        drop(file);
        tracing::debug!("discarding {:?}", &partial);
        discard(&partial, &created_dirs)
    }
}
