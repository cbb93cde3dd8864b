//! QR decoding backed by rqrr

use super::decoder::{DecodedSymbol, SymbolDecoder, Symbology};
use super::error::{DecodeError, ScanError};
use super::frame::DecodableImage;
use log::{debug, info};
use rqrr::PreparedImage;

/// rqrr 解码器，仅支持 QR 码
///
/// QR 定位图案与方向无关，因此旋转元数据不参与检测。
pub struct RqrrDecoder {
    symbology: Symbology,
}

impl RqrrDecoder {
    pub fn new(symbology: Symbology) -> Result<Self, ScanError> {
        if symbology != Symbology::QrCode {
            return Err(ScanError::Config(format!(
                "rqrr decoder only supports QR codes (requested {:?})",
                symbology
            )));
        }
        info!("🔧 RqrrDecoder: created for {:?}", symbology);
        Ok(Self { symbology })
    }
}

impl SymbolDecoder for RqrrDecoder {
    fn decode(&self, image: &DecodableImage) -> Result<Vec<DecodedSymbol>, DecodeError> {
        let w = image.width() as usize;
        let h = image.height() as usize;

        let mut prepared =
            PreparedImage::prepare_from_greyscale(w, h, |x, y| image.luma(x as u32, y as u32));
        let grids = prepared.detect_grids();
        debug!(
            "🔍 {} candidate grid(s) in {}x{} frame ({})",
            grids.len(),
            w,
            h,
            image.rotation()
        );

        let mut symbols = Vec::with_capacity(grids.len());
        let mut failures = Vec::new();
        for grid in grids {
            let mut bytes = Vec::new();
            match grid.decode_to(&mut bytes) {
                Ok(_) => {
                    let mut symbol = DecodedSymbol::new(self.symbology);
                    // 非 UTF-8 内容只保留原始字节
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        symbol = symbol.with_raw_value(text).with_display_value(text);
                    }
                    symbols.push(symbol.with_raw_bytes(bytes));
                }
                Err(e) => failures.push(format!("{:?}", e)),
            }
        }

        // 只有全部候选都失败时才视为解码失败
        if symbols.is_empty() && !failures.is_empty() {
            return Err(DecodeError::new(failures.join("; ")));
        }
        Ok(symbols)
    }

    fn symbology(&self) -> Symbology {
        self.symbology
    }
}
