//! 二维码扫描器

use crate::core::scanner::{
    QueueSink, RqrrDecoder, ScanConfig, ScanError, ScanMessage, ScanPipeline, ScanStats,
};
use flutter_rust_bridge::frb;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// 二维码扫描器 - 异步解码，结果由宿主轮询
///
/// ```dart
/// final scanner = QrScanner.create(configJson: null);
/// scanner.submitFrame(pixels: yPlane, width: w, height: h, rotation: 90);
/// final results = scanner.takeResults();
/// ```
#[frb(opaque)]
pub struct QrScanner {
    pipeline: ScanPipeline,
    results: Arc<QueueSink>,
}

impl QrScanner {
    /// 创建扫描器；config_json 为 JSON5 格式，None 使用默认配置
    #[frb(sync)]
    pub fn create(config_json: Option<String>) -> Result<Self, ScanError> {
        crate::init_logging();

        let config = match config_json {
            Some(text) => ScanConfig::from_json5(&text)?,
            None => ScanConfig::default(),
        };
        let decoder = Arc::new(RqrrDecoder::new(config.symbology)?);
        let results = Arc::new(QueueSink::new());
        let pipeline = ScanPipeline::with_config(decoder, results.clone(), config)?;

        info!("📷 QrScanner: created");
        Ok(Self { pipeline, results })
    }

    /// 提交一帧灰度数据（立即返回）
    #[frb(sync)]
    pub fn submit_frame(&self, pixels: Vec<u8>, width: i32, height: i32, rotation: i32) {
        self.pipeline.submit(&pixels, width, height, rotation);
    }

    /// 取出已解码的结果
    #[frb(sync)]
    pub fn take_results(&self) -> Vec<ScanMessage> {
        self.results.drain()
    }

    /// 等待进行中的解码完成
    pub fn wait_idle(&self, timeout_ms: u64) -> bool {
        self.pipeline.wait_idle(Duration::from_millis(timeout_ms))
    }

    #[frb(sync, getter)]
    pub fn stats(&self) -> ScanStats {
        self.pipeline.get_stats()
    }

    #[frb(sync)]
    pub fn reset_stats(&self) {
        self.pipeline.reset_stats()
    }

    /// 允许再次投递已出现过的内容
    #[frb(sync)]
    pub fn forget_repeats(&self) {
        self.pipeline.forget_repeats()
    }
}

impl Drop for QrScanner {
    fn drop(&mut self) {
        info!("🗑️ QrScanner: released");
    }
}
