//! Media delivery: presigned redirects and byte serving with Range support.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use slidecast_storage::StorageProvider;

use crate::error::{ApiError, ApiResult};

/// TTL for presigned download URLs.
const PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Parsed single-range request: inclusive byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte to serve.
    pub start: u64,
    /// Last byte to serve (inclusive).
    pub end: u64,
}

/// Parse a `Range: bytes=a-b` header against a known total size. Returns
/// `None` for absent, multi-range, or malformed headers (callers serve the
/// full body); out-of-bounds ranges yield an error the caller maps to 416.
pub fn parse_range(header_value: Option<&str>, total: u64) -> Result<Option<ByteRange>, ()> {
    let Some(raw) = header_value else {
        return Ok(None);
    };
    let Some(spec) = raw.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        // Multi-range requests fall back to the full body.
        return Ok(None);
    }
    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return Ok(None);
    };
    if total == 0 {
        return Err(());
    }

    let range = if start_raw.is_empty() {
        // Suffix form: last N bytes.
        let count: u64 = end_raw.parse().map_err(|_| ())?;
        if count == 0 {
            return Err(());
        }
        ByteRange {
            start: total.saturating_sub(count),
            end: total - 1,
        }
    } else {
        let start: u64 = start_raw.parse().map_err(|_| ())?;
        let end: u64 = if end_raw.is_empty() {
            total - 1
        } else {
            end_raw.parse().map_err(|_| ())?
        };
        ByteRange {
            start,
            end: end.min(total - 1),
        }
    };

    if range.start > range.end || range.start >= total {
        return Err(());
    }
    Ok(Some(range))
}

/// First key among `candidates` that exists in storage.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when none exist.
pub async fn resolve_existing_key(
    storage: &dyn StorageProvider,
    candidates: &[String],
) -> ApiResult<String> {
    for key in candidates {
        if storage.exists(key).await? {
            return Ok(key.clone());
        }
    }
    Err(ApiError::NotFound)
}

/// Serve a storage object: a 307 to a presigned URL for cloud backends
/// (unless proxying is forced), otherwise the bytes themselves with
/// single-range support.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the object is absent.
pub async fn serve_object(
    storage: &dyn StorageProvider,
    key: &str,
    content_type: &str,
    attachment_name: Option<&str>,
    proxy_cloud_media: bool,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let disposition = attachment_name
        .map(|name| format!("attachment; filename=\"{name}\""))
        .unwrap_or_else(|| "inline".to_string());

    if storage.supports_presign() && !proxy_cloud_media {
        let url = storage
            .presign(key, PRESIGN_TTL, Some(&disposition), Some(content_type))
            .await?;
        let location = HeaderValue::from_str(&url)
            .map_err(|_| ApiError::internal("presigned url is not a valid header value"))?;
        return Ok((
            StatusCode::TEMPORARY_REDIRECT,
            [(header::LOCATION, location)],
        )
            .into_response());
    }

    let bytes = storage.get_bytes(key).await?;
    let total = bytes.len() as u64;
    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let base_headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        ),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition)
                .unwrap_or_else(|_| HeaderValue::from_static("inline")),
        ),
        (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
    ];

    match parse_range(range_header, total) {
        Ok(None) => Ok((StatusCode::OK, base_headers, bytes).into_response()),
        Ok(Some(range)) => {
            let slice = bytes[range.start as usize..=(range.end as usize)].to_vec();
            let content_range = HeaderValue::from_str(&format!(
                "bytes {}-{}/{}",
                range.start, range.end, total
            ))
            .map_err(|_| ApiError::internal("content-range header"))?;
            Ok((
                StatusCode::PARTIAL_CONTENT,
                base_headers,
                [(header::CONTENT_RANGE, content_range)],
                slice,
            )
                .into_response())
        }
        Err(()) => {
            let content_range = HeaderValue::from_str(&format!("bytes */{total}"))
                .map_err(|_| ApiError::internal("content-range header"))?;
            Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, content_range)],
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_foreign_headers_serve_full_body() {
        assert_eq!(parse_range(None, 100), Ok(None));
        assert_eq!(parse_range(Some("items=0-5"), 100), Ok(None));
        assert_eq!(parse_range(Some("bytes=0-5,10-20"), 100), Ok(None));
    }

    #[test]
    fn bounded_ranges_parse_inclusively() {
        assert_eq!(
            parse_range(Some("bytes=0-99"), 200),
            Ok(Some(ByteRange { start: 0, end: 99 }))
        );
        // Open-ended range runs to the last byte.
        assert_eq!(
            parse_range(Some("bytes=50-"), 100),
            Ok(Some(ByteRange { start: 50, end: 99 }))
        );
        // Suffix range serves the last N bytes.
        assert_eq!(
            parse_range(Some("bytes=-10"), 100),
            Ok(Some(ByteRange { start: 90, end: 99 }))
        );
        // Over-long end is clamped.
        assert_eq!(
            parse_range(Some("bytes=0-1000"), 100),
            Ok(Some(ByteRange { start: 0, end: 99 }))
        );
    }

    #[test]
    fn unsatisfiable_ranges_are_rejected() {
        assert_eq!(parse_range(Some("bytes=100-"), 100), Err(()));
        assert_eq!(parse_range(Some("bytes=5-2"), 100), Err(()));
        assert_eq!(parse_range(Some("bytes=0-1"), 0), Err(()));
    }
}
