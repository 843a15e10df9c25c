//! Logging Module
//!
//! `tracing` subscriber setup shared by the CLI and the inference server, and
//! a small per-epoch logger for the training loop.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use super::format_duration;

/// Environment variable overriding the log filter (e.g. `crop_disease=trace`)
pub const LOG_ENV: &str = "CROP_DISEASE_LOG";

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Include the module path of each event
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids, for `--verbose`
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    pub fn from_verbose_flag(verbose: bool) -> Self {
        if verbose {
            Self::verbose()
        } else {
            Self::default()
        }
    }

    /// Filter directive used when `CROP_DISEASE_LOG` is unset
    pub fn default_directive(&self) -> String {
        self.level.to_tracing_level().to_string().to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Per-epoch timing and metric logs for the training loop
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Zero-based epoch index
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Remaining time estimate from the mean epoch duration so far
    fn eta_seconds(&self) -> f64 {
        let done = (self.epoch + 1) as f64;
        let remaining = self.total_epochs.saturating_sub(self.epoch + 1) as f64;
        self.training_start.elapsed().as_secs_f64() / done * remaining
    }

    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, val_accuracy: f64) {
        tracing::info!(
            "Epoch {}/{} took {} | loss {:.4} | train acc {:.2}% | val acc {:.2}% | ETA {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(self.epoch_start.elapsed().as_secs_f64()),
            train_loss,
            train_accuracy * 100.0,
            val_accuracy * 100.0,
            format_duration(self.eta_seconds())
        );
    }

    pub fn log_new_best(&self, accuracy: f64) {
        tracing::info!(
            "Checkpoint updated at epoch {} (val acc {:.2}%)",
            self.epoch + 1,
            accuracy * 100.0
        );
    }

    pub fn log_complete(&self, best_accuracy: f64) {
        tracing::info!(
            "Finished {} epochs in {} | best val acc {:.2}%",
            self.total_epochs,
            format_duration(self.training_start.elapsed().as_secs_f64()),
            best_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_selects_debug() {
        assert_eq!(LogConfig::from_verbose_flag(false).level, LogLevel::Info);
        assert_eq!(LogConfig::from_verbose_flag(true).level, LogLevel::Debug);
        assert_eq!(LogConfig::verbose().default_directive(), "debug");
        assert_eq!(LogConfig::default().default_directive(), "info");
    }

    #[test]
    fn test_eta_after_last_epoch_is_zero() {
        let mut logger = TrainingLogger::new(3);
        logger.start_epoch(2);
        assert_eq!(logger.epoch, 2);
        assert_eq!(logger.eta_seconds(), 0.0);
        logger.end_epoch(0.5, 0.8, 0.75);
    }
}
