use std::io::IsTerminal;

use anyhow::Context;

/// How progress is displayed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// `ProgressBar` when stderr is a terminal, `TextUpdates` otherwise
    #[default]
    #[value(alias = "Auto")]
    Auto,
    /// Animated progress bar
    #[value(name = "ProgressBar", alias = "progress-bar")]
    ProgressBar,
    /// Periodic text lines, appropriate for logging
    #[value(name = "TextUpdates", alias = "text-updates")]
    TextUpdates,
}

#[derive(Clone, Debug, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Delay between updates, defaults depend on the display type.
    pub progress_delay: Option<std::time::Duration>,
}

/// Parses human-readable delays like "200ms", "10s" or "5min".
pub fn parse_progress_delay(delay: &str) -> anyhow::Result<std::time::Duration> {
    humantime::parse_duration(delay)
        .with_context(|| format!("invalid progress delay {delay:?}, expected e.g. '200ms' or '10s'"))
}

enum Display {
    Bar(indicatif::ProgressBar),
    Text(TextPrinter),
    Hidden,
}

struct TextPrinter {
    label: String,
    delay: std::time::Duration,
    start_time: std::time::Instant,
    last_update: std::time::Instant,
    last_bytes: u64,
}

impl TextPrinter {
    fn line(&mut self, copied: u64, total: u64) -> String {
        let time_now = std::time::Instant::now();
        let total_duration_secs = (time_now - self.start_time).as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let average_rate = rate(copied, total_duration_secs);
        let current_rate = rate(copied - self.last_bytes, curr_duration_secs);
        self.last_update = time_now;
        self.last_bytes = copied;
        let percent = if total == 0 {
            100.0
        } else {
            copied as f64 * 100.0 / total as f64
        };
        format!(
            "{}: {} / {} ({:.1}%) average: {}/s current: {}/s",
            self.label,
            bytesize::ByteSize(copied),
            bytesize::ByteSize(total),
            percent,
            bytesize::ByteSize(average_rate),
            bytesize::ByteSize(current_rate),
        )
    }
}

fn rate(bytes: u64, secs: f64) -> u64 {
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Byte counter for one copy, rendered to stderr.
///
/// Participates in the fan-out as a plain writer; its writes never fail.
pub struct ProgressSink {
    total: u64,
    copied: u64,
    display: Display,
}

impl ProgressSink {
    pub fn new(label: &str, total: u64, settings: &ProgressSettings) -> Self {
        let progress_type = match settings.progress_type {
            ProgressType::Auto if std::io::stderr().is_terminal() => ProgressType::ProgressBar,
            ProgressType::Auto => ProgressType::TextUpdates,
            other => other,
        };
        let display = match progress_type {
            ProgressType::ProgressBar => {
                let delay = settings
                    .progress_delay
                    .unwrap_or(std::time::Duration::from_millis(200));
                Display::Bar(progress_bar(label, total, delay))
            }
            _ => {
                let now = std::time::Instant::now();
                Display::Text(TextPrinter {
                    label: label.to_string(),
                    delay: settings
                        .progress_delay
                        .unwrap_or(std::time::Duration::from_secs(10)),
                    start_time: now,
                    last_update: now,
                    last_bytes: 0,
                })
            }
        };
        Self {
            total,
            copied: 0,
            display,
        }
    }

    /// Sink that counts but never draws.
    #[must_use]
    pub fn hidden(total: u64) -> Self {
        Self {
            total,
            copied: 0,
            display: Display::Hidden,
        }
    }

    #[must_use]
    pub fn copied(&self) -> u64 {
        self.copied
    }

    /// Finalizes the display; a bar that did not reach the total is left as is.
    pub fn finish(self) {
        match self.display {
            Display::Bar(bar) => {
                if self.copied == self.total {
                    bar.finish();
                } else {
                    bar.abandon();
                }
            }
            Display::Text(mut printer) => {
                eprintln!("{}", printer.line(self.copied, self.total));
            }
            Display::Hidden => {}
        }
    }
}

fn progress_bar(label: &str, total: u64, delay: std::time::Duration) -> indicatif::ProgressBar {
    let refresh_hz = (1000 / delay.as_millis().max(1)).clamp(1, 20) as u8;
    let bar = indicatif::ProgressBar::with_draw_target(
        Some(total),
        indicatif::ProgressDrawTarget::stderr_with_hz(refresh_hz),
    );
    let style = indicatif::ProgressStyle::with_template(
        "{msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}

impl std::io::Write for ProgressSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let len = buf.len() as u64;
        self.copied += len;
        match &mut self.display {
            Display::Bar(bar) => bar.inc(len),
            Display::Text(printer) => {
                if printer.last_update.elapsed() >= printer.delay {
                    eprintln!("{}", printer.line(self.copied, self.total));
                }
            }
            Display::Hidden => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
