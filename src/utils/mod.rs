//! Utilities: error types, logging, metrics, and console helpers

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{
    CheckpointError, CropDiseaseError, DecodeError, Result, ShapeMismatchError,
};
pub use logging::{init_logging, LogConfig, LogLevel, TrainingLogger};
pub use metrics::{AccuracyTracker, RunningAverage};

/// Seconds as `12.3s`, `4m 05s`, or `2h 07m`
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let whole = seconds.round() as u64;
    let (hours, minutes, secs) = (whole / 3600, (whole % 3600) / 60, whole % 60);
    if hours == 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}h {:02}m", hours, minutes)
    }
}

/// Count with thousands separators, e.g. `54,305`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
