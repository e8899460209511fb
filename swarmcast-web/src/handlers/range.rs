//! HTTP Range request handling for media streaming
//!
//! Supports the single-range forms `bytes=start-end` and `bytes=start-`.
//! Headers that cannot be parsed at all fall back to a full response, while
//! ranges that parse but cannot be satisfied are rejected with 416.

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Bytes covered, at least one.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// What a request's Range header asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable Range header; serve the whole file with 200
    Full,
    /// Serve this slice with 206
    Partial(ByteRange),
    /// Parsed, but outside the file or inverted; answer 416
    Unsatisfiable,
}

/// Interprets a Range header against a file length.
///
/// # Examples
/// ```
/// use swarmcast_web::handlers::range::{ByteRange, RangeRequest, parse_range_header};
/// assert_eq!(
///     parse_range_header(Some("bytes=100-199"), 1000),
///     RangeRequest::Partial(ByteRange { start: 100, end: 199 })
/// );
/// assert_eq!(parse_range_header(Some("bytes=2000-3000"), 1000), RangeRequest::Unsatisfiable);
/// assert_eq!(parse_range_header(Some("bytes=-500"), 1000), RangeRequest::Full);
/// ```
pub fn parse_range_header(header: Option<&str>, file_length: u64) -> RangeRequest {
    let Some(spec) = header.and_then(|value| value.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    // Suffix ranges are not supported
    let Ok(start) = start_str.trim().parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = match end_str.trim() {
        "" => None,
        value => match value.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return RangeRequest::Full,
        },
    };

    if end.is_some_and(|end| start > end) || start >= file_length {
        return RangeRequest::Unsatisfiable;
    }

    let last_byte = file_length - 1;
    RangeRequest::Partial(ByteRange {
        start,
        end: end.map_or(last_byte, |end| end.min(last_byte)),
    })
}

/// Reads the Range header value if it is valid UTF-8.
pub fn extract_range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::RANGE)
        .and_then(|range| range.to_str().ok())
}

/// Headers carried by every streaming response.
pub fn apply_streaming_headers(headers: &mut HeaderMap) {
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
}

/// Builds a 200 or 206 response around a body producing exactly the range.
///
/// # Errors
/// Returns `INTERNAL_SERVER_ERROR` if the response cannot be assembled
pub fn build_range_response(
    range: Option<ByteRange>,
    file_length: u64,
    content_type: &str,
    body: Body,
) -> Result<Response<Body>, StatusCode> {
    let mut response = Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(ACCEPT_RANGES, "bytes")
        .header(CACHE_CONTROL, "no-cache");

    response = match range {
        Some(range) => response
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_LENGTH, range.length())
            .header(
                CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, file_length),
            ),
        None => response
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, file_length),
    };

    response
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// 416 response naming the actual file length.
///
/// # Errors
/// Returns `INTERNAL_SERVER_ERROR` if the response cannot be assembled
pub fn build_unsatisfiable_response(file_length: u64) -> Result<Response<Body>, StatusCode> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(ACCEPT_RANGES, "bytes")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONTENT_RANGE, format!("bytes */{file_length}"))
        .header(CONTENT_LENGTH, 0)
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
