use super::error::DecodeError;
use super::frame::DecodableImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 码制族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    #[default]
    QrCode,
    DataMatrix,
    Aztec,
    Ean13,
    Code128,
}

/// 文本提取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextExtraction {
    /// Raw bytes win whenever present, even when the decoded text is empty.
    #[default]
    PreserveSource,
    /// Empty raw-byte text falls through to raw value / display value.
    SkipEmptyRawBytes,
}

/// 解码器输出的单个符号
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedSymbol {
    pub format: Symbology,
    pub raw_bytes: Option<Vec<u8>>,
    pub raw_value: Option<String>,
    pub display_value: Option<String>,
}

impl DecodedSymbol {
    pub fn new(format: Symbology) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_raw_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.raw_bytes = Some(bytes.into());
        self
    }

    pub fn with_raw_value(mut self, value: impl Into<String>) -> Self {
        self.raw_value = Some(value.into());
        self
    }

    pub fn with_display_value(mut self, value: impl Into<String>) -> Self {
        self.display_value = Some(value.into());
        self
    }

    /// 按优先级提取文本：raw bytes → raw value → display value
    ///
    /// Raw bytes are decoded lossily; invalid sequences become U+FFFD.
    pub fn extract_text(&self, mode: TextExtraction) -> Option<String> {
        if let Some(bytes) = &self.raw_bytes {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match mode {
                TextExtraction::PreserveSource => return Some(text),
                TextExtraction::SkipEmptyRawBytes if !text.is_empty() => return Some(text),
                TextExtraction::SkipEmptyRawBytes => {}
            }
        }

        if let Some(raw) = self.raw_value.as_deref().filter(|s| !s.is_empty()) {
            return Some(raw.to_string());
        }

        self.display_value
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Opaque symbol decoding capability shared by every submission of a pipeline.
///
/// Implementations are built once with a fixed configuration and must tolerate
/// concurrent `decode` calls from worker threads.
pub trait SymbolDecoder: Send + Sync {
    fn decode(&self, image: &DecodableImage) -> Result<Vec<DecodedSymbol>, DecodeError>;

    fn symbology(&self) -> Symbology {
        Symbology::QrCode
    }
}

type DecodeFn = dyn Fn(&DecodableImage) -> Result<Vec<DecodedSymbol>, DecodeError> + Send + Sync;

pub struct MockDecoder {
    behavior: Box<DecodeFn>,
    calls: AtomicUsize,
}

impl MockDecoder {
    /// 始终返回零个符号
    pub fn new() -> Self {
        Self::with_pattern(|_| Ok(Vec::new()))
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&DecodableImage) -> Result<Vec<DecodedSymbol>, DecodeError> + Send + Sync + 'static,
    {
        Self {
            behavior: Box::new(pattern),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_symbols(symbols: Vec<DecodedSymbol>) -> Self {
        Self::with_pattern(move |_| Ok(symbols.clone()))
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::with_pattern(move |_| Err(DecodeError::new(message.clone())))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolDecoder for MockDecoder {
    fn decode(&self, image: &DecodableImage) -> Result<Vec<DecodedSymbol>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behavior)(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::frame::{FrameConverter, Rotation};

    fn qr() -> DecodedSymbol {
        DecodedSymbol::new(Symbology::QrCode)
    }

    #[test]
    fn test_raw_bytes_take_priority() {
        let symbol = qr()
            .with_raw_bytes("héllo".as_bytes())
            .with_raw_value("raw")
            .with_display_value("display");
        assert_eq!(
            symbol.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("héllo")
        );
    }

    #[test]
    fn test_raw_value_when_no_bytes() {
        let symbol = qr().with_raw_value("ABC123").with_display_value("display");
        assert_eq!(
            symbol.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("ABC123")
        );
    }

    #[test]
    fn test_display_value_fallback() {
        let symbol = qr().with_raw_value("").with_display_value("shown");
        assert_eq!(
            symbol.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("shown")
        );
    }

    #[test]
    fn test_nothing_present() {
        assert_eq!(qr().extract_text(TextExtraction::PreserveSource), None);

        let blank = qr().with_raw_value("").with_display_value("");
        assert_eq!(blank.extract_text(TextExtraction::PreserveSource), None);
    }

    #[test]
    fn test_invalid_utf8_bytes_decode_lossily() {
        // Shift-JIS "テス" 不是合法 UTF-8，仍然优先于 raw value
        let symbol = qr()
            .with_raw_bytes(vec![0x83, 0x65, 0x83, 0x58])
            .with_raw_value("fallback");
        assert_eq!(
            symbol.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("\u{FFFD}e\u{FFFD}X")
        );
        assert_eq!(
            symbol.extract_text(TextExtraction::SkipEmptyRawBytes).as_deref(),
            Some("\u{FFFD}e\u{FFFD}X")
        );

        let bytes_only = qr().with_raw_bytes(vec![0xFF, 0x41]);
        assert_eq!(
            bytes_only.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("\u{FFFD}A")
        );
    }

    #[test]
    fn test_empty_raw_bytes_policies() {
        let symbol = qr().with_raw_bytes(Vec::new()).with_raw_value("fallback");

        // 保留原始行为：空字符串被视为有效结果
        assert_eq!(
            symbol.extract_text(TextExtraction::PreserveSource).as_deref(),
            Some("")
        );
        assert_eq!(
            symbol.extract_text(TextExtraction::SkipEmptyRawBytes).as_deref(),
            Some("fallback")
        );
    }

    #[test]
    fn test_mock_decoder_counts_calls() {
        let image = FrameConverter::convert(&[0; 4], 2, 2, Rotation::Deg0).unwrap();
        let decoder = MockDecoder::with_symbols(vec![qr().with_raw_value("x")]);

        assert_eq!(decoder.decode(&image).unwrap().len(), 1);
        assert_eq!(decoder.decode(&image).unwrap().len(), 1);
        assert_eq!(decoder.call_count(), 2);

        let failing = MockDecoder::failing("nope");
        assert_eq!(failing.decode(&image).unwrap_err().message(), "nope");
    }
}
