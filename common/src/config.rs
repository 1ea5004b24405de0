//! Configuration types for output and logging

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print the full diagnostic chain of errors and log at DEBUG level or above
    pub debug: bool,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Default log filter directive for this configuration
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        match (self.debug, self.verbose) {
            (_, 3..) => "trace",
            (true, _) | (false, 2) => "debug",
            (false, 1) => "info",
            (false, _) => "error",
        }
    }
}
