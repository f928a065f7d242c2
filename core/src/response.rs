//! Classification of free-form module output.
//!
//! The ESP-01 AT firmware has no framing beyond a handful of well-known
//! substrings. All scanning of response text goes through this module so a
//! module with structured replies could be supported by replacing it alone.

/// Well-known substrings emitted by the AT firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Ok,
    Error,
    /// "busy p...": still processing a previous request.
    BusyProcessing,
    /// Data prompt after `AT+CIPSEND=<n>`.
    Prompt,
    Connected,
    IncomingData,
    Closed,
    SendOk,
}

impl Marker {
    pub const fn token(self) -> &'static str {
        match self {
            Marker::Ok => "OK",
            Marker::Error => "ERROR",
            Marker::BusyProcessing => "busy p",
            Marker::Prompt => ">",
            Marker::Connected => "CONNECT",
            Marker::IncomingData => "+IPD",
            Marker::Closed => "CLOSED",
            Marker::SendOk => "SEND OK",
        }
    }

    pub fn found_in(self, text: &str) -> bool {
        text.contains(self.token())
    }
}

/// What a frame means to a caller waiting for one of `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// `expected[index]` is present.
    Matched(usize),
    /// The error marker is present and no expected token is.
    Failed,
    Pending,
}

/// Ordered substring search: expected tokens first, in the order given, then
/// the error marker.
pub fn classify(text: &str, expected: &[&str]) -> Classification {
    if let Some(index) = expected.iter().position(|token| text.contains(token)) {
        return Classification::Matched(index);
    }
    if Marker::Error.found_in(text) {
        return Classification::Failed;
    }
    Classification::Pending
}

/// Station address from an `AT+CIFSR` reply, e.g. `+CIFSR:STAIP,"192.168.1.42"`.
/// An unassociated station reports `0.0.0.0`, which is treated as absent.
pub fn station_address(text: &str) -> Option<&str> {
    const TAG: &str = "STAIP,\"";
    let start = text.find(TAG)? + TAG.len();
    let len = text[start..].find('"')?;
    let address = &text[start..start + len];
    if address.is_empty() || address == "0.0.0.0" {
        None
    } else {
        Some(address)
    }
}

/// HTTP status code from a `+IPD,<n>:HTTP/1.1 <code> ...` frame.
pub fn http_status(text: &str) -> Option<u16> {
    let ipd = text.find(Marker::IncomingData.token())?;
    let after = &text[ipd..];
    let payload = &after[after.find(':')? + 1..];
    let status_line = payload.strip_prefix("HTTP/")?;
    let mut parts = status_line.split_ascii_whitespace();
    parts.next()?;
    parts.next()?.parse().ok()
}
