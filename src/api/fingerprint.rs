//! Owner fingerprinting.
//!
//! The fingerprint is a fairness heuristic for the active-jobs cap, not an
//! authentication primitive; collisions are acceptable.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in the fingerprint (16 hex characters).
const FINGERPRINT_BYTES: usize = 8;

/// Derive the owner fingerprint from request headers.
///
/// `anon_` + the first 16 hex characters of
/// `sha256(ip + "|" + user-agent + "|" + accept-language)`.
pub fn owner_fingerprint(headers: &HeaderMap) -> String {
    let ip = client_ip(headers);
    let user_agent = header_str(headers, header::USER_AGENT.as_str());
    let language = header_str(headers, header::ACCEPT_LANGUAGE.as_str());

    let digest = Sha256::digest(format!("{}|{}|{}", ip, user_agent, language));
    let hex: String = digest
        .iter()
        .take(FINGERPRINT_BYTES)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("anon_{}", hex)
}

/// Resolve the client IP: first `X-Forwarded-For` entry, else `X-Real-IP`,
/// else "unknown".
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(entries: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in entries {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = owner_fingerprint(&headers(&[
            ("x-forwarded-for", "203.0.113.7"),
            ("user-agent", "Mozilla/5.0"),
            ("accept-language", "en-US"),
        ]));
        assert!(fp.starts_with("anon_"));
        assert_eq!(fp.len(), "anon_".len() + 16);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let entries = [
            ("x-forwarded-for", "203.0.113.7"),
            ("user-agent", "Mozilla/5.0"),
            ("accept-language", "en-US"),
        ];
        assert_eq!(
            owner_fingerprint(&headers(&entries)),
            owner_fingerprint(&headers(&entries))
        );
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let a = owner_fingerprint(&headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]));
        let b = owner_fingerprint(&headers(&[("x-forwarded-for", "203.0.113.7")]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_real_ip_fallback_changes_fingerprint() {
        let via_real_ip = owner_fingerprint(&headers(&[("x-real-ip", "203.0.113.7")]));
        let unknown = owner_fingerprint(&headers(&[]));
        assert_ne!(via_real_ip, unknown);
    }
}
