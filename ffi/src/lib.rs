//! C-ABI wrapper around `esp01-core`.
//!
//! # Overview
//! Firmware written in C links this library, fills an `FfiPlatform` with its
//! UART and tick callbacks, and drives the module through `esp01_*`
//! functions. Its UART interrupt handlers forward into `esp01_on_rx_bytes`,
//! `esp01_on_rx_idle` and `esp01_on_tx_complete`.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary; a caught panic reports `Error`.
//! - Blocking calls return `FfiStatus`. Text results go into caller-owned
//!   buffers, so nothing allocated here has to be freed by C except the
//!   handle itself.
//! - The interrupt entry points only take a shared reference to the handle
//!   and may run while a blocking call is in progress.

pub mod types;

use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use esp01_core::{DriverConfig, Esp01, HttpMethod, HttpRequest, Marker, Status, WifiError};
use log::warn;

use types::*;

fn guarded(f: impl FnOnce() -> FfiStatus) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(FfiStatus::Error)
}

fn status_of<T>(result: &Result<T, WifiError>) -> FfiStatus {
    Status::from(result).into()
}

/// # Safety
/// `handle` must be null or come from `esp01_new` and not yet be freed.
unsafe fn handle_ref<'a>(handle: *const FfiEsp01) -> Option<&'a FfiEsp01> {
    unsafe { handle.as_ref() }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create a driver bound to `platform`.
///
/// `config_json` may be null for defaults, or a JSON object overriding any
/// subset of the driver settings. Returns null if `platform` is null, a
/// callback is missing, or the configuration is invalid. Free the handle with
/// `esp01_free`.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_new(
    platform: *const FfiPlatform,
    config_json: *const c_char,
) -> *mut FfiEsp01 {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(platform) = (unsafe { platform.as_ref() }) else {
            return std::ptr::null_mut();
        };
        let Some((serial, clock)) = platform.split() else {
            warn!("platform table has a null callback");
            return std::ptr::null_mut();
        };
        let config = if config_json.is_null() {
            DriverConfig::default()
        } else {
            let parsed = unsafe { str_arg(config_json) }
                .ok_or(WifiError::InvalidArgument("config is not UTF-8"))
                .and_then(|json| DriverConfig::from_json(json).map_err(WifiError::from));
            match parsed {
                Ok(config) => config,
                Err(e) => {
                    warn!("rejected driver config: {e}");
                    return std::ptr::null_mut();
                }
            }
        };
        match Esp01::bind(config, clock, |_rx| serial) {
            Ok(inner) => Box::into_raw(Box::new(FfiEsp01 { inner })),
            Err(e) => {
                warn!("rejected driver config: {e}");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a handle created by `esp01_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_free(handle: *mut FfiEsp01) {
    if !handle.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(handle) });
        }));
    }
}

/// Arm reception, wait for boot, probe the module and select station mode.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_init(handle: *const FfiEsp01) -> FfiStatus {
    guarded(|| match unsafe { handle_ref(handle) } {
        Some(h) => status_of(&h.inner.init()),
        None => FfiStatus::Error,
    })
}

// ---------------------------------------------------------------------------
// Interrupt entry points
// ---------------------------------------------------------------------------

/// Deposit received bytes; returns how many fit in the receive buffer.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_on_rx_bytes(handle: *const FfiEsp01, data: *const u8, len: usize) -> usize {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(h) = (unsafe { handle_ref(handle) }) else {
            return 0;
        };
        if data.is_null() || len == 0 {
            return 0;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data, len) };
        h.inner.receiver().write_primary(bytes)
    }))
    .unwrap_or(0)
}

/// Idle line after `byte_count` bytes: publishes the frame, then re-arms
/// reception through the platform's `start_receive`.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_on_rx_idle(handle: *const FfiEsp01, byte_count: usize) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(h) = unsafe { handle_ref(handle) } {
            if let Err(e) = h.inner.on_receive_idle(byte_count) {
                warn!("{e}");
            }
        }
    }));
}

#[unsafe(no_mangle)]
pub extern "C" fn esp01_on_tx_complete(handle: *const FfiEsp01) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(h) = unsafe { handle_ref(handle) } {
            h.inner.receiver().on_transmit_complete();
        }
    }));
}

// ---------------------------------------------------------------------------
// Commands and connection
// ---------------------------------------------------------------------------

/// Send a raw AT command (including its `\r\n`) and wait for `expected`.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_send_command(
    handle: *const FfiEsp01,
    command: *const c_char,
    expected: *const c_char,
    timeout_ms: u64,
) -> FfiStatus {
    guarded(|| {
        let (Some(h), Some(command), Some(expected)) = (unsafe {
            (handle_ref(handle), str_arg(command), str_arg(expected))
        }) else {
            return FfiStatus::Error;
        };
        status_of(&h.inner.send_command(command, expected, timeout_ms))
    })
}

/// Join a network and copy the station address into `address_out`
/// (NUL-terminated) unless it is null. Returns `Error` if the address does
/// not fit in `address_len` bytes; the module stays joined.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_connect(
    handle: *const FfiEsp01,
    ssid: *const c_char,
    password: *const c_char,
    address_out: *mut c_char,
    address_len: usize,
) -> FfiStatus {
    guarded(|| {
        let (Some(h), Some(ssid)) = (unsafe { (handle_ref(handle), str_arg(ssid)) }) else {
            return FfiStatus::Error;
        };
        let password = unsafe { str_arg(password) }.unwrap_or("");
        match h.inner.connect(ssid, password) {
            Ok(_) if address_out.is_null() => FfiStatus::Ok,
            Ok(address) if unsafe { copy_out(&address, address_out, address_len) } => FfiStatus::Ok,
            Ok(_) => {
                warn!("address buffer of {address_len} bytes too small");
                FfiStatus::Error
            }
            Err(e) => e.status().into(),
        }
    })
}

/// Copy the station address into `out` (NUL-terminated). Returns `Error` if
/// it does not fit in `len` bytes.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_get_address(handle: *const FfiEsp01, out: *mut c_char, len: usize) -> FfiStatus {
    guarded(|| {
        let Some(h) = (unsafe { handle_ref(handle) }) else {
            return FfiStatus::Error;
        };
        match h.inner.get_address() {
            Ok(address) if unsafe { copy_out(&address, out, len) } => FfiStatus::Ok,
            Ok(_) => FfiStatus::Error,
            Err(e) => e.status().into(),
        }
    })
}

/// Copy the most recent frame into `out`, truncated to fit.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_last_response(handle: *const FfiEsp01, out: *mut c_char, len: usize) -> usize {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(h) = (unsafe { handle_ref(handle) }) else {
            return 0;
        };
        if len == 0 {
            return 0;
        }
        let text = h.inner.last_response();
        let mut end = text.len().min(len - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if unsafe { copy_out(&text[..end], out, len) } {
            end
        } else {
            0
        }
    }))
    .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Sockets and HTTP
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn esp01_send_tcp(
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    payload: *const u8,
    payload_len: usize,
) -> FfiStatus {
    guarded(|| {
        let (Some(h), Some(host)) = (unsafe { (handle_ref(handle), str_arg(host)) }) else {
            return FfiStatus::Error;
        };
        let payload = if payload.is_null() {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(payload, payload_len) }
        };
        status_of(&h.inner.send_tcp(host, port, payload))
    })
}

/// Send an HTTP request. `headers` may be null or a list ending with a
/// null key; `body` may be null. `reply` may be null.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_http_send(
    handle: *const FfiEsp01,
    method: *const c_char,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    body: *const c_char,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    guarded(|| {
        let (Some(h), Some(method), Some(host), Some(path), Some(headers)) = (unsafe {
            (
                handle_ref(handle),
                str_arg(method),
                str_arg(host),
                str_arg(path),
                header_list(headers),
            )
        }) else {
            return FfiStatus::Error;
        };
        let mut request = HttpRequest::new(method, host, port, path);
        request.headers = headers;
        request.body = unsafe { str_arg(body) }
            .filter(|b| !b.is_empty())
            .map(str::to_owned);
        send_request(h, &request, timeout_ms, max_retries, reply)
    })
}

#[allow(clippy::too_many_arguments)]
fn send_with_method(
    method: HttpMethod,
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    body: *const c_char,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    let body = if method.has_body() {
        body
    } else {
        std::ptr::null()
    };
    let method = match method {
        HttpMethod::Get => c"GET",
        HttpMethod::Post => c"POST",
        HttpMethod::Put => c"PUT",
        HttpMethod::Delete => c"DELETE",
    };
    esp01_http_send(
        handle,
        method.as_ptr(),
        host,
        port,
        path,
        headers,
        body,
        timeout_ms,
        max_retries,
        reply,
    )
}

fn send_request(
    h: &FfiEsp01,
    request: &HttpRequest,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    let result = h.inner.http_send(request, timeout_ms, max_retries);
    if let (Ok(r), Some(out)) = (&result, unsafe { reply.as_mut() }) {
        *out = FfiHttpReply {
            attempts: r.attempts,
            status_code: r.status_code.unwrap_or(0),
            closed: r.marker == Marker::Closed,
        };
    }
    status_of(&result)
}

#[unsafe(no_mangle)]
pub extern "C" fn esp01_http_get(
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    send_with_method(
        HttpMethod::Get,
        handle,
        host,
        port,
        path,
        headers,
        std::ptr::null(),
        timeout_ms,
        max_retries,
        reply,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn esp01_http_post(
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    body: *const c_char,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    send_with_method(
        HttpMethod::Post,
        handle,
        host,
        port,
        path,
        headers,
        body,
        timeout_ms,
        max_retries,
        reply,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn esp01_http_put(
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    body: *const c_char,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    send_with_method(
        HttpMethod::Put,
        handle,
        host,
        port,
        path,
        headers,
        body,
        timeout_ms,
        max_retries,
        reply,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn esp01_http_delete(
    handle: *const FfiEsp01,
    host: *const c_char,
    port: u16,
    path: *const c_char,
    headers: *const FfiHeader,
    timeout_ms: u64,
    max_retries: u8,
    reply: *mut FfiHttpReply,
) -> FfiStatus {
    send_with_method(
        HttpMethod::Delete,
        handle,
        host,
        port,
        path,
        headers,
        std::ptr::null(),
        timeout_ms,
        max_retries,
        reply,
    )
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// Static NUL-terminated name of `status`; never freed.
#[unsafe(no_mangle)]
pub extern "C" fn esp01_status_str(status: FfiStatus) -> *const c_char {
    match status {
        FfiStatus::Ok => c"OK".as_ptr(),
        FfiStatus::Error => c"ERROR".as_ptr(),
        FfiStatus::Timeout => c"TIMEOUT".as_ptr(),
        FfiStatus::Busy => c"BUSY".as_ptr(),
    }
}
