use std::io::Write;

use crate::progress::ProgressSink;
use crate::targets::OpenTarget;

/// Writer that duplicates every chunk to all targets, in order, and then to the progress sink.
///
/// A write stops at the first target that fails; the remaining members do not see that chunk.
/// The index of the failed target is kept so the caller can attribute the error.
pub struct FanOut<'a> {
    targets: &'a mut [OpenTarget],
    progress: Option<&'a mut ProgressSink>,
    failed: Option<usize>,
}

impl<'a> FanOut<'a> {
    pub fn new(targets: &'a mut [OpenTarget], progress: Option<&'a mut ProgressSink>) -> Self {
        Self {
            targets,
            progress,
            failed: None,
        }
    }

    /// Target whose write failed last, if any.
    #[must_use]
    pub fn failed_target(&self) -> Option<&OpenTarget> {
        self.failed.and_then(|index| self.targets.get(index))
    }
}

impl Write for FanOut<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for (index, target) in self.targets.iter_mut().enumerate() {
            if let Err(error) = target.handle.write_all(buf) {
                self.failed = Some(index);
                return Err(error);
            }
        }
        if let Some(progress) = self.progress.as_mut() {
            progress.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for (index, target) in self.targets.iter_mut().enumerate() {
            if let Err(error) = target.handle.flush() {
                self.failed = Some(index);
                return Err(error);
            }
        }
        Ok(())
    }
}
