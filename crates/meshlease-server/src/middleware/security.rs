//! Request validation middleware: header sanitization.
//!
//! Rejects requests whose header values look like injection attempts or
//! simply exceed sane length bounds, before any handler or the auth layer
//! ever sees them.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

const MAX_HEADER_NAME_LEN: usize = 256;
const MAX_HEADER_VALUE_LEN: usize = 8 * 1024;
const MAX_URL_LEN: usize = 8 * 1024;

const DENYLIST: &[&str] = &["<script", "javascript:", "onload=", "onerror="];

pub async fn header_sanitization_middleware(req: Request, next: Next) -> Response {
    if req.uri().to_string().len() > MAX_URL_LEN {
        return AppError::BadRequest("INVALID_REQUEST", "request URL exceeds the maximum length".to_owned()).into_response();
    }

    for (name, value) in req.headers() {
        if name.as_str().len() > MAX_HEADER_NAME_LEN {
            return AppError::BadRequest("INVALID_REQUEST", "header name exceeds the maximum length".to_owned()).into_response();
        }
        let Ok(value_str) = value.to_str() else { continue };
        if value_str.len() > MAX_HEADER_VALUE_LEN {
            return AppError::BadRequest("INVALID_REQUEST", "header value exceeds the maximum length".to_owned()).into_response();
        }
        if contains_denylisted_pattern(value_str) {
            return AppError::BadRequest("INVALID_REQUEST", "header value contains a disallowed pattern".to_owned()).into_response();
        }
    }

    next.run(req).await
}

fn contains_denylisted_pattern(value: &str) -> bool {
    let lower = value.to_lowercase();
    DENYLIST.iter().any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_known_bad_patterns_case_insensitively() {
        assert!(contains_denylisted_pattern("<SCRIPT>alert(1)</SCRIPT>"));
        assert!(contains_denylisted_pattern("onLoad=doEvil()"));
        assert!(!contains_denylisted_pattern("perfectly normal header value"));
    }
}
