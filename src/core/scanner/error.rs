use thiserror::Error;

/// Failure reported by a symbol decoder for one submitted image.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("Invalid config: {0}")]
    Config(String),
}

impl ScanError {
    pub(crate) fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    /// 从 panic payload 中提取可读信息
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Unexpected(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_converts_into_scan_error() {
        let err: ScanError = DecodeError::new("no finder patterns").into();
        assert!(matches!(err, ScanError::Decode(_)));
        assert_eq!(err.to_string(), "Decode failed: no finder patterns");
    }

    #[test]
    fn test_panic_payload_message() {
        let err = ScanError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "Unexpected error: boom");

        let err = ScanError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "Unexpected error: owned boom");

        let err = ScanError::from_panic(Box::new(42u32));
        assert_eq!(err.to_string(), "Unexpected error: unknown panic");
    }
}
