//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The platform hands the driver a table of callbacks plus an opaque context
//! pointer. `FfiSerial` and `FfiClock` adapt that table to the core's
//! `Serial` and `Clock` traits, so the core never sees a raw pointer.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use esp01_core::{Clock, Esp01, SerialError, Status};

/// Outcome of every driver call, as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    Error = 1,
    Timeout = 2,
    Busy = 3,
}

impl From<Status> for FfiStatus {
    fn from(s: Status) -> Self {
        match s {
            Status::Ok => FfiStatus::Ok,
            Status::Error => FfiStatus::Error,
            Status::Timeout => FfiStatus::Timeout,
            Status::Busy => FfiStatus::Busy,
        }
    }
}

impl From<FfiStatus> for Status {
    fn from(s: FfiStatus) -> Self {
        match s {
            FfiStatus::Ok => Status::Ok,
            FfiStatus::Error => Status::Error,
            FfiStatus::Timeout => Status::Timeout,
            FfiStatus::Busy => Status::Busy,
        }
    }
}

/// One HTTP header. A list of headers ends at the first entry whose `key`
/// is null.
#[repr(C)]
pub struct FfiHeader {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Start transmitting `len` bytes. Return `false` if the line could not
/// start; otherwise call `esp01_on_tx_complete` once the bytes are out.
pub type TransmitFn = extern "C" fn(ctx: *mut c_void, data: *const u8, len: usize) -> bool;
/// Arm idle-line reception. Called by `esp01_init` and again by
/// `esp01_on_rx_idle` after every frame, so one-shot idle reception stays
/// armed without help from the interrupt handler.
pub type StartReceiveFn = extern "C" fn(ctx: *mut c_void) -> bool;
/// Monotonic milliseconds.
pub type NowMsFn = extern "C" fn(ctx: *mut c_void) -> u64;
pub type SleepMsFn = extern "C" fn(ctx: *mut c_void, ms: u64);

/// Platform callbacks. Every function pointer must be set.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiPlatform {
    pub ctx: *mut c_void,
    pub transmit: Option<TransmitFn>,
    pub start_receive: Option<StartReceiveFn>,
    pub now_ms: Option<NowMsFn>,
    pub sleep_ms: Option<SleepMsFn>,
}

/// Extra detail about a successful HTTP request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FfiHttpReply {
    pub attempts: u8,
    /// 0 when the first data frame carried no status line.
    pub status_code: u16,
    /// The peer closed before any data frame was seen.
    pub closed: bool,
}

pub struct FfiSerial {
    ctx: *mut c_void,
    transmit: TransmitFn,
    start_receive: StartReceiveFn,
}

impl esp01_core::Serial for FfiSerial {
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), SerialError> {
        if (self.transmit)(self.ctx, bytes.as_ptr(), bytes.len()) {
            Ok(())
        } else {
            Err(SerialError("transmit refused by platform".to_string()))
        }
    }

    fn start_receive(&self) -> Result<(), SerialError> {
        if (self.start_receive)(self.ctx) {
            Ok(())
        } else {
            Err(SerialError("receive could not be armed".to_string()))
        }
    }
}

pub struct FfiClock {
    ctx: *mut c_void,
    now_ms: NowMsFn,
    sleep_ms: SleepMsFn,
}

impl Clock for FfiClock {
    fn now_ms(&self) -> u64 {
        (self.now_ms)(self.ctx)
    }

    fn sleep_ms(&self, ms: u64) {
        (self.sleep_ms)(self.ctx, ms)
    }
}

impl FfiPlatform {
    /// Split into the core's trait objects. `None` if a callback is missing.
    pub(crate) fn split(&self) -> Option<(FfiSerial, FfiClock)> {
        Some((
            FfiSerial {
                ctx: self.ctx,
                transmit: self.transmit?,
                start_receive: self.start_receive?,
            },
            FfiClock {
                ctx: self.ctx,
                now_ms: self.now_ms?,
                sleep_ms: self.sleep_ms?,
            },
        ))
    }
}

/// Opaque driver handle. C callers receive a pointer to this and pass it
/// back into every FFI function.
pub struct FfiEsp01 {
    pub(crate) inner: Esp01<FfiSerial, FfiClock>,
}

/// Borrow a C string as UTF-8. `None` for null or invalid UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Collect a null-key-terminated header list.
///
/// # Safety
/// `headers` must be null or point to an array ending with a null `key`.
pub(crate) unsafe fn header_list(headers: *const FfiHeader) -> Option<Vec<(String, String)>> {
    let mut out = Vec::new();
    if headers.is_null() {
        return Some(out);
    }
    let mut cursor = headers;
    loop {
        let header = unsafe { &*cursor };
        if header.key.is_null() {
            return Some(out);
        }
        let key = unsafe { str_arg(header.key) }?;
        let value = unsafe { str_arg(header.value) }.unwrap_or("");
        out.push((key.to_string(), value.to_string()));
        cursor = unsafe { cursor.add(1) };
    }
}

/// Copy `text` into a caller buffer of `len` bytes, NUL-terminated.
/// Returns `false` without writing when it does not fit.
///
/// # Safety
/// `out` must be valid for `len` bytes of writes.
pub(crate) unsafe fn copy_out(text: &str, out: *mut c_char, len: usize) -> bool {
    if out.is_null() || text.len() + 1 > len {
        return false;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr(), out.cast::<u8>(), text.len());
        *out.add(text.len()) = 0;
    }
    true
}
