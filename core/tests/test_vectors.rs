//! Check request serialization and response reading against the JSON vectors
//! in `test-vectors/`.
//!
//! The vectors are shared with any other port of the driver, so they describe
//! wire bytes and decoded values only, never Rust types.

use esp01_core::response::{classify, http_status, station_address, Classification};
use esp01_core::{HttpRequest, WifiError};
use pretty_assertions::assert_eq;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Vectors<T> {
    cases: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RequestInput {
    method: String,
    host: String,
    port: u16,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestCase {
    name: String,
    request: RequestInput,
    capacity: usize,
    expected_wire: Option<String>,
    expected_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseCase {
    name: String,
    frame: String,
    expected_tokens: Vec<String>,
    classification: String,
    station_address: Option<String>,
    http_status: Option<u16>,
}

fn error_kind(err: &WifiError) -> &'static str {
    match err {
        WifiError::Overflow { .. } => "Overflow",
        WifiError::InvalidArgument(_) => "InvalidArgument",
        _ => "Other",
    }
}

fn classification_name(c: Classification) -> String {
    match c {
        Classification::Matched(index) => format!("matched:{index}"),
        Classification::Failed => "failed".to_string(),
        Classification::Pending => "pending".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn http_request_vectors() {
    let raw = include_str!("../../test-vectors/http_requests.json");
    let vectors: Vectors<RequestCase> = serde_json::from_str(raw).unwrap();
    assert!(!vectors.cases.is_empty());

    for case in vectors.cases {
        let name = &case.name;
        let input = case.request;
        let request = HttpRequest {
            method: input.method,
            host: input.host,
            port: input.port,
            path: input.path,
            headers: input.headers,
            body: input.body,
        };

        match (request.serialize(case.capacity), case.expected_wire, case.expected_error) {
            (Ok(wire), Some(expected), None) => {
                let text = String::from_utf8(wire.into_bytes()).unwrap();
                assert_eq!(text, expected, "{name}: wire bytes");
                assert!(text.len() <= case.capacity, "{name}: within capacity");
            }
            (Err(err), None, Some(expected)) => {
                assert_eq!(error_kind(&err), expected, "{name}: error kind");
            }
            (result, wire, error) => {
                panic!("{name}: got {result:?}, vector expects wire={wire:?} error={error:?}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Vectors<ResponseCase> = serde_json::from_str(raw).unwrap();

    for case in vectors.cases {
        let name = &case.name;
        let tokens: Vec<&str> = case.expected_tokens.iter().map(String::as_str).collect();

        assert_eq!(
            classification_name(classify(&case.frame, &tokens)),
            case.classification,
            "{name}: classification"
        );
        assert_eq!(
            station_address(&case.frame).map(str::to_owned),
            case.station_address,
            "{name}: station address"
        );
        assert_eq!(http_status(&case.frame), case.http_status, "{name}: status code");
    }
}
