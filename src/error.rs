use std::path::PathBuf;

use thiserror::Error;

/// Failure categories surfaced by a generation call.
///
/// Everything except `InvalidRange` aborts the call. An invalid frequency
/// range is recovered inside the STFT engine by falling back to the full
/// spectrum, so callers only see it when they build a `FrequencyRange`
/// themselves.
#[derive(Debug, Error)]
pub enum SpectroError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not allocate {what} ({elements} elements)")]
    Allocation { what: &'static str, elements: usize },

    #[error("signal too short: {samples} samples, need at least {window_size}")]
    SignalTooShort { samples: usize, window_size: usize },

    #[error("invalid frequency range {min_hz:.1}-{max_hz:.1} Hz")]
    InvalidRange { min_hz: f64, max_hz: f64 },

    #[error("render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, SpectroError>;

impl SpectroError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Wrap a format-level decode failure as an I/O error on `path`.
    pub(crate) fn decode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()))
    }

    pub(crate) fn render(message: impl std::fmt::Display) -> Self {
        Self::Render(message.to_string())
    }
}

/// Reserve exactly `len` slots, reporting failure instead of aborting.
pub(crate) fn try_buffer<T: Clone>(what: &'static str, len: usize, fill: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SpectroError::Allocation { what, elements: len })?;
    buffer.resize(len, fill);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = SpectroError::SignalTooShort { samples: 10, window_size: 1024 };
        assert_eq!(err.to_string(), "signal too short: 10 samples, need at least 1024");

        let err = SpectroError::io("missing.wav", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.to_string().contains("missing.wav"));
    }

    #[test]
    fn test_try_buffer_fills_and_reports_overflow() {
        let buffer = try_buffer("test", 4, 0.5f64).unwrap();
        assert_eq!(buffer, vec![0.5; 4]);

        let err = try_buffer("huge", usize::MAX, 0u64).unwrap_err();
        assert!(matches!(err, SpectroError::Allocation { what: "huge", .. }));
    }
}
