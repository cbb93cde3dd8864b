//! C ABI for engine plug-ins: frames in, `(target, method, message)` callbacks out.

use crate::core::scanner::{ResultSink, RqrrDecoder, ScanConfig, ScanError, ScanPipeline};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const SCAN_BRIDGE_OK: i32 = 0;
pub const SCAN_BRIDGE_ALREADY_INITIALIZED: i32 = 1;
pub const SCAN_BRIDGE_ERROR: i32 = -1;

/// Host message dispatch, e.g. a thin wrapper around `UnitySendMessage`.
/// Strings are only valid for the duration of the call.
pub type HostMessageCallback =
    unsafe extern "C" fn(target: *const c_char, method: *const c_char, message: *const c_char);

static SCANNER: Lazy<Mutex<Option<Arc<ScanPipeline>>>> = Lazy::new(|| Mutex::new(None));

struct HostCallbackSink {
    callback: HostMessageCallback,
    method: CString,
}

impl ResultSink for HostCallbackSink {
    fn deliver(&self, target: &str, message: &str) {
        let (Ok(target), Ok(message)) = (CString::new(target), CString::new(message)) else {
            warn!("⚠️ Dropping result containing an interior NUL byte");
            return;
        };
        unsafe { (self.callback)(target.as_ptr(), self.method.as_ptr(), message.as_ptr()) }
    }
}

fn current() -> Option<Arc<ScanPipeline>> {
    SCANNER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
}

unsafe fn build_pipeline(
    callback: HostMessageCallback,
    config_json: *const c_char,
) -> Result<ScanPipeline, ScanError> {
    let config = if config_json.is_null() {
        ScanConfig::default()
    } else {
        let text = CStr::from_ptr(config_json)
            .to_str()
            .map_err(|e| ScanError::Config(format!("config is not UTF-8: {}", e)))?;
        ScanConfig::from_json5(text)?
    };

    let method = CString::new(config.callback_method.as_str())
        .map_err(|e| ScanError::Config(format!("callback_method: {}", e)))?;
    let decoder = Arc::new(RqrrDecoder::new(config.symbology)?);
    let sink = Arc::new(HostCallbackSink { callback, method });
    ScanPipeline::with_config(decoder, sink, config)
}

/// Builds the process-wide scanner. The decoder is constructed once here and
/// reused by every later `scan_bridge_scan_image` call.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn scan_bridge_init(
    callback: Option<HostMessageCallback>,
    config_json: *const c_char,
) -> i32 {
    crate::init_logging();

    let Some(callback) = callback else {
        error!("❌ scan_bridge_init: callback is null");
        return SCAN_BRIDGE_ERROR;
    };

    let mut slot = SCANNER.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!("⚠️ scan_bridge_init: already initialized");
        return SCAN_BRIDGE_ALREADY_INITIALIZED;
    }

    let built = panic::catch_unwind(AssertUnwindSafe(|| build_pipeline(callback, config_json)))
        .unwrap_or_else(|payload| Err(ScanError::from_panic(payload)));
    match built {
        Ok(pipeline) => {
            *slot = Some(Arc::new(pipeline));
            info!("✅ scan_bridge_init: ready");
            SCAN_BRIDGE_OK
        }
        Err(e) => {
            error!("❌ scan_bridge_init: {}", e);
            SCAN_BRIDGE_ERROR
        }
    }
}

/// Submits one single-channel frame. Returns immediately; the buffer is not
/// retained after the call.
///
/// # Safety
/// `data` must be null or point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn scan_bridge_scan_image(
    data: *const u8,
    len: usize,
    width: i32,
    height: i32,
    rotation: i32,
) {
    if data.is_null() || len == 0 {
        return;
    }
    let Some(pipeline) = current() else {
        warn!("⚠️ scan_bridge_scan_image: not initialized");
        return;
    };

    let pixels = std::slice::from_raw_parts(data, len);
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| {
        pipeline.submit(pixels, width, height, rotation)
    })) {
        error!("❌ scan_bridge_scan_image: {}", ScanError::from_panic(payload));
    }
}

/// Blocks until no decode is in flight or the timeout elapses.
#[no_mangle]
pub extern "C" fn scan_bridge_wait_idle(timeout_ms: u64) -> bool {
    current()
        .map(|pipeline| pipeline.wait_idle(Duration::from_millis(timeout_ms)))
        .unwrap_or(true)
}

/// Lets previously delivered payloads through again when `suppress_repeats`
/// is enabled. No-op otherwise.
#[no_mangle]
pub extern "C" fn scan_bridge_forget_repeats() {
    if let Some(pipeline) = current() {
        pipeline.forget_repeats();
    }
}

/// Stats as a JSON string; release with `scan_bridge_free_string`. Null when
/// the scanner is not initialized.
#[no_mangle]
pub extern "C" fn scan_bridge_stats_json() -> *mut c_char {
    let Some(pipeline) = current() else {
        return std::ptr::null_mut();
    };
    serde_json::to_string(&pipeline.get_stats())
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map_or(std::ptr::null_mut(), CString::into_raw)
}

/// # Safety
/// `s` must be null or a pointer returned by `scan_bridge_stats_json`.
#[no_mangle]
pub unsafe extern "C" fn scan_bridge_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Drops the scanner. Decodes already queued still finish and call back.
#[no_mangle]
pub extern "C" fn scan_bridge_shutdown() {
    let previous = SCANNER.lock().unwrap_or_else(PoisonError::into_inner).take();
    if previous.is_some() {
        info!("🛑 scan_bridge_shutdown");
    }
}
