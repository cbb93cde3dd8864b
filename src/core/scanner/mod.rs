//! 扫码桥 - 将宿主传入的灰度帧转换为可解码图像，异步解码并把文本结果投递回宿主
//!
//! 流程：
//! 1. 校验几何信息并裁剪（可选）
//! 2. 灰度 → RGBA 转换，旋转角度作为元数据保留
//! 3. 线程池中调用解码器
//! 4. 按 raw bytes → raw value → display value 提取文本并投递

pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod qr;
pub mod sink;

pub use config::{ScanConfig, Throttle};
pub use decoder::{DecodedSymbol, MockDecoder, SymbolDecoder, Symbology, TextExtraction};
pub use error::{DecodeError, ScanError};
pub use frame::{DecodableImage, FrameConverter, RawFrame, Rotation, ScanRegion};
pub use pipeline::{ScanPipeline, ScanStats};
pub use qr::RqrrDecoder;
pub use sink::{DedupSink, QueueSink, ResultSink, ScanMessage};
