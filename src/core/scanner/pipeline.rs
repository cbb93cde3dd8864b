use super::config::{ScanConfig, Throttle};
use super::decoder::{SymbolDecoder, TextExtraction};
use super::error::ScanError;
use super::frame::{DecodableImage, RawFrame, Rotation, ScanRegion};
use super::sink::{DedupSink, ResultSink};
use log::{debug, error, info, trace, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// 扫描统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub submitted: u64,
    pub ignored_empty: u64,
    pub throttled: u64,
    pub rejected: u64,
    pub decoded: u64,
    pub failed: u64,
    pub delivered: u64,
    pub dropped_symbols: u64,
}

#[derive(Default)]
struct FlightState {
    in_flight: usize,
    last_finished: Option<Instant>,
}

/// 跟踪进行中的解码任务，并实现单飞/间隔节流
#[derive(Default)]
struct FlightTracker {
    state: Mutex<FlightState>,
    idle: Condvar,
}

impl FlightTracker {
    fn lock(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_begin(self: &Arc<Self>, throttle: &Throttle) -> Option<FlightGuard> {
        let mut state = self.lock();

        if throttle.single_flight && state.in_flight > 0 {
            return None;
        }
        if let (Some(min), Some(last)) = (throttle.min_interval(), state.last_finished) {
            if last.elapsed() < min {
                return None;
            }
        }

        state.in_flight += 1;
        Some(FlightGuard {
            tracker: Arc::clone(self),
            decoded: false,
        })
    }

    /// 只有真正执行过解码才开始计算扫描间隔
    fn finish(&self, decoded: bool) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if decoded {
            state.last_finished = Some(Instant::now());
        }
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .idle
            .wait_timeout_while(state, timeout, |s| s.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.in_flight == 0
    }

    fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

/// Released when the submission finishes, whether it delivered, failed or panicked.
struct FlightGuard {
    tracker: Arc<FlightTracker>,
    decoded: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.decoded);
    }
}

/// 单次解码任务，在线程池中执行
struct DecodeJob {
    decoder: Arc<dyn SymbolDecoder>,
    sink: Arc<dyn ResultSink>,
    target: Arc<str>,
    extraction: TextExtraction,
    stats: Arc<Mutex<ScanStats>>,
    frame_id: u64,
    guard: FlightGuard,
}

impl DecodeJob {
    fn run(mut self, image: DecodableImage) {
        self.guard.decoded = true;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.decode_and_deliver(&image)))
            .unwrap_or_else(|payload| Err(ScanError::from_panic(payload)));

        match outcome {
            Ok(delivered) => {
                debug!("✅ Frame #{}: {} result(s) delivered", self.frame_id, delivered);
            }
            Err(e @ ScanError::Decode(_)) => {
                error!("❌ Frame #{}: scan fail: {}", self.frame_id, e);
                record(&self.stats, |s| s.failed += 1);
            }
            Err(e) => {
                error!("❌ Frame #{}: {}", self.frame_id, e);
                record(&self.stats, |s| s.failed += 1);
            }
        }
    }

    fn decode_and_deliver(&self, image: &DecodableImage) -> Result<usize, ScanError> {
        let symbols = self.decoder.decode(image)?;
        record(&self.stats, |s| s.decoded += 1);

        let mut delivered = 0;
        for symbol in &symbols {
            match symbol.extract_text(self.extraction) {
                Some(text) if !text.is_empty() => {
                    self.sink.deliver(&self.target, &text);
                    record(&self.stats, |s| s.delivered += 1);
                    delivered += 1;
                }
                _ => {
                    trace!(
                        "Frame #{}: dropping {:?} symbol without text",
                        self.frame_id,
                        symbol.format
                    );
                    record(&self.stats, |s| s.dropped_symbols += 1);
                }
            }
        }
        Ok(delivered)
    }
}

/// 转发到注入的 sink，使 `DedupSink` 可以持有 trait object
struct Forward(Arc<dyn ResultSink>);

impl ResultSink for Forward {
    fn deliver(&self, target: &str, message: &str) {
        self.0.deliver(target, message)
    }
}

fn record(stats: &Mutex<ScanStats>, update: impl FnOnce(&mut ScanStats)) {
    update(&mut stats.lock().unwrap_or_else(PoisonError::into_inner));
}

/// 扫描流水线 - 持有唯一的解码器实例，异步解码并投递结果
///
/// `submit` 从不阻塞也从不失败：空帧被忽略，坏帧被记录并丢弃，
/// 解码失败只写日志。
pub struct ScanPipeline {
    decoder: Arc<dyn SymbolDecoder>,
    sink: Arc<dyn ResultSink>,
    repeats: Option<Arc<DedupSink<Forward>>>,
    target: Arc<str>,
    extraction: TextExtraction,
    region: ScanRegion,
    throttle: Throttle,
    pool: ThreadPool,
    tracker: Arc<FlightTracker>,
    stats: Arc<Mutex<ScanStats>>,
}

impl ScanPipeline {
    pub fn new(
        decoder: Arc<dyn SymbolDecoder>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ScanError> {
        Self::with_config(decoder, sink, ScanConfig::default())
    }

    pub fn with_config(
        decoder: Arc<dyn SymbolDecoder>,
        sink: Arc<dyn ResultSink>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        let threads = config.resolved_worker_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("scan-worker-{}", i))
            .panic_handler(|_| error!("❌ Scan worker panicked"))
            .build()
            .map_err(|e| ScanError::Unexpected(format!("failed to build worker pool: {}", e)))?;

        let repeats = config
            .suppress_repeats
            .then(|| Arc::new(DedupSink::new(Forward(Arc::clone(&sink)))));
        let sink: Arc<dyn ResultSink> = match &repeats {
            Some(dedup) => Arc::clone(dedup) as Arc<dyn ResultSink>,
            None => sink,
        };

        info!(
            "🚀 ScanPipeline: {:?} decoder, target '{}', {} worker(s)",
            decoder.symbology(),
            config.target_name,
            threads
        );

        Ok(Self {
            decoder,
            sink,
            repeats,
            target: Arc::from(config.target_name.as_str()),
            extraction: config.text_extraction,
            region: config.region,
            throttle: config.throttle,
            pool,
            tracker: Arc::new(FlightTracker::default()),
            stats: Arc::new(Mutex::new(ScanStats::default())),
        })
    }

    /// 提交一帧；结果通过构造时注入的 sink 异步投递
    pub fn submit(&self, pixels: &[u8], width: i32, height: i32, rotation: i32) {
        self.submit_to(pixels, width, height, rotation, Arc::clone(&self.sink));
    }

    /// 同 `submit`，但结果投递到指定的 sink
    pub fn submit_to(
        &self,
        pixels: &[u8],
        width: i32,
        height: i32,
        rotation: i32,
        sink: Arc<dyn ResultSink>,
    ) {
        if pixels.is_empty() {
            trace!("Ignoring empty frame");
            record(&self.stats, |s| s.ignored_empty += 1);
            return;
        }

        let frame_id = {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.submitted += 1;
            stats.submitted
        };

        let Some(guard) = self.tracker.try_begin(&self.throttle) else {
            trace!("Frame #{}: throttled", frame_id);
            record(&self.stats, |s| s.throttled += 1);
            return;
        };

        let prepared = panic::catch_unwind(AssertUnwindSafe(|| {
            self.prepare(pixels, width, height, rotation)
        }))
        .unwrap_or_else(|payload| Err(ScanError::from_panic(payload)));

        let image = match prepared {
            Ok(image) => image,
            Err(e @ ScanError::InvalidFrame(_)) => {
                warn!("⚠️ Frame #{} rejected: {}", frame_id, e);
                record(&self.stats, |s| s.rejected += 1);
                return;
            }
            Err(e) => {
                error!("❌ Frame #{}: {}", frame_id, e);
                record(&self.stats, |s| s.rejected += 1);
                return;
            }
        };

        debug!(
            "📷 Frame #{}: {}x{} ({}) queued for decoding",
            frame_id,
            image.width(),
            image.height(),
            image.rotation()
        );

        let job = DecodeJob {
            decoder: Arc::clone(&self.decoder),
            sink,
            target: Arc::clone(&self.target),
            extraction: self.extraction,
            stats: Arc::clone(&self.stats),
            frame_id,
            guard,
        };
        self.pool.spawn(move || job.run(image));
    }

    fn prepare(
        &self,
        pixels: &[u8],
        width: i32,
        height: i32,
        rotation: i32,
    ) -> Result<DecodableImage, ScanError> {
        let rotation = Rotation::from_degrees(rotation)?;
        RawFrame::new(pixels, width, height, rotation)?
            .apply_region(&self.region)?
            .to_image()
    }

    /// 等待所有进行中的解码完成；超时返回 false
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.tracker.wait_idle(timeout)
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }

    /// 清空已投递内容的记录（仅在 suppress_repeats 开启时有效）
    pub fn forget_repeats(&self) {
        if let Some(dedup) = &self.repeats {
            dedup.forget_all();
            debug!("🔄 Repeat suppression reset");
        }
    }

    pub fn get_stats(&self) -> ScanStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = ScanStats::default();
    }
}

impl Drop for ScanPipeline {
    fn drop(&mut self) {
        info!(
            "🗑️ ScanPipeline: released ({} decode(s) still in flight)",
            self.tracker.in_flight()
        );
    }
}
