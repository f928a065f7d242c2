//! HTTP/1.1 requests over the module's single TCP socket.
//!
//! # Design
//! `HttpRequest` describes a request as plain data and serializes itself into
//! a [`BoundedBuf`], so a request that would not fit is rejected before any
//! byte reaches the line. Sending is a bounded retry loop around the socket
//! chain: each attempt settles, opens, announces, pushes, then waits for the
//! module to report either incoming data or that the peer closed. Any failed
//! step force-closes the socket and moves on to the next attempt.
//!
//! Bodies are text. Binary-safe bodies are not supported.

use log::{debug, info, warn};

use crate::buffer::BoundedBuf;
use crate::client::Esp01;
use crate::error::WifiError;
use crate::platform::{Clock, Serial};
use crate::response::{http_status, Marker};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry the caller's body.
    pub fn has_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

/// An HTTP request described as plain data.
///
/// Headers are written in insertion order. `Content-Type: text/plain` is
/// added when no header supplies a content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

impl HttpRequest {
    pub fn new(method: &str, host: &str, port: u16, path: &str) -> Self {
        Self {
            method: method.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), WifiError> {
        if self.method.is_empty() {
            return Err(WifiError::InvalidArgument("method must not be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(WifiError::InvalidArgument("path must start with '/'"));
        }
        if self.host.is_empty() {
            return Err(WifiError::InvalidArgument("host must not be empty"));
        }
        Ok(())
    }

    /// Serialize into at most `capacity` bytes.
    pub fn serialize(&self, capacity: usize) -> Result<BoundedBuf, WifiError> {
        self.validate()?;
        let body = self.body.as_deref().unwrap_or("");
        let mut out = BoundedBuf::new(capacity, "http request");

        out.push_fmt(format_args!("{} {} HTTP/1.1\r\n", self.method, self.path))?;
        out.push_fmt(format_args!("Host: {}\r\n", self.host))?;
        out.push_str("Connection: close\r\n")?;
        if !body.is_empty() {
            out.push_fmt(format_args!("Content-Length: {}\r\n", body.len()))?;
        }
        let mut has_content_type = false;
        for (key, value) in &self.headers {
            has_content_type |= key.eq_ignore_ascii_case("Content-Type");
            out.push_fmt(format_args!("{key}: {value}\r\n"))?;
        }
        if !has_content_type {
            out.push_fmt(format_args!("Content-Type: {DEFAULT_CONTENT_TYPE}\r\n"))?;
        }
        out.push_str("\r\n")?;
        out.push_str(body)?;
        Ok(out)
    }
}

/// What the module reported for a request that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Attempts used, starting at 1.
    pub attempts: u8,
    /// `IncomingData` or `Closed`.
    pub marker: Marker,
    /// Parsed from the first `+IPD` frame when it starts with a status line.
    pub status_code: Option<u16>,
    /// The frame that ended the wait.
    pub raw: String,
}

impl<S: Serial, C: Clock> Esp01<S, C> {
    /// Serialize `request` and send it, making up to `max_retries` attempts.
    pub fn http_send(
        &self,
        request: &HttpRequest,
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        let wire = request.serialize(self.config.request_buffer_len)?;
        let awaited = [Marker::IncomingData.token(), Marker::Closed.token()];

        for attempt in 1..=max_retries {
            self.engine.sleep_ms(self.config.http_settle_ms);
            if let Err(e) = self.transfer(&request.host, request.port, wire.as_bytes()) {
                warn!("attempt {attempt}: {} {} failed: {e}", request.method, request.path);
                self.close_socket(self.config.close_timeout_ms);
                continue;
            }
            let (index, raw) = match self.engine.expect_frame(&awaited, timeout_ms) {
                Ok(found) => found,
                Err(e) => {
                    warn!("attempt {attempt}: no HTTP response: {e}");
                    self.close_socket(self.config.close_timeout_ms);
                    continue;
                }
            };
            debug!("attempt {attempt}: HTTP response received");
            self.close_socket(timeout_ms);

            let marker = if index == 0 {
                Marker::IncomingData
            } else {
                Marker::Closed
            };
            let reply = HttpReply {
                attempts: attempt,
                marker,
                status_code: http_status(&raw),
                raw,
            };
            info!(
                "{} {}:{}{} -> {:?} after {} attempt(s)",
                request.method, request.host, request.port, request.path, reply.status_code, attempt
            );
            return Ok(reply);
        }
        Err(WifiError::RetriesExhausted {
            attempts: max_retries,
        })
    }

    pub fn http_get(
        &self,
        host: &str,
        port: u16,
        path: &str,
        headers: &[(&str, &str)],
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        self.http_method(HttpMethod::Get, host, port, path, headers, "", timeout_ms, max_retries)
    }

    pub fn http_delete(
        &self,
        host: &str,
        port: u16,
        path: &str,
        headers: &[(&str, &str)],
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        self.http_method(HttpMethod::Delete, host, port, path, headers, "", timeout_ms, max_retries)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn http_post(
        &self,
        host: &str,
        port: u16,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        self.http_method(HttpMethod::Post, host, port, path, headers, body, timeout_ms, max_retries)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn http_put(
        &self,
        host: &str,
        port: u16,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        self.http_method(HttpMethod::Put, host, port, path, headers, body, timeout_ms, max_retries)
    }

    #[allow(clippy::too_many_arguments)]
    fn http_method(
        &self,
        method: HttpMethod,
        host: &str,
        port: u16,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
        timeout_ms: u64,
        max_retries: u8,
    ) -> Result<HttpReply, WifiError> {
        let mut request = HttpRequest::new(method.as_str(), host, port, path);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if method.has_body() && !body.is_empty() {
            request = request.body(body);
        }
        self.http_send(&request, timeout_ms, max_retries)
    }
}
