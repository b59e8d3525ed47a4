//! URL validation and event-list normalization for the webhook registry.
//!
//! Validates destination URLs (syntax, scheme, internal-address protection)
//! and normalizes subscription lists: an empty or absent list means the
//! wildcard subscription.

use std::net::IpAddr;

use crate::error::OutboxError;
use vellum_db::models::WILDCARD_EVENT;

/// Validate a webhook destination URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is set for dev/test)
/// 3. Host is not a private/internal address unless `allow_internal` is set
pub fn validate_webhook_url(
    url: &str,
    allow_http: bool,
    allow_internal: bool,
) -> Result<(), OutboxError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| OutboxError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(OutboxError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(OutboxError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| OutboxError::InvalidUrl("URL must have a host".to_string()))?;

    if !allow_internal {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

/// Validate that a host is not a private/internal address.
pub fn validate_host_not_internal(host: &str) -> Result<(), OutboxError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(OutboxError::RestrictedDestination(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(OutboxError::RestrictedDestination(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

/// Check if an IP address belongs to a private/internal range.
fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // CGNAT
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Normalize a subscription list: empty or absent means "subscribe to all".
///
/// Entries are trimmed and deduplicated; a list containing the wildcard
/// collapses to just the wildcard.
pub fn normalize_event_list(events: Option<Vec<String>>) -> Vec<String> {
    let mut list: Vec<String> = events
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();

    if list.is_empty() || list.iter().any(|e| e == WILDCARD_EVENT) {
        return vec![WILDCARD_EVENT.to_string()];
    }

    list.sort();
    list.dedup();
    list
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_https_url() {
        assert!(validate_webhook_url("https://example.com/hooks", false, false).is_ok());
    }

    #[test]
    fn test_http_rejected_by_default() {
        let result = validate_webhook_url("http://example.com/hooks", false, false);
        assert!(matches!(result.unwrap_err(), OutboxError::InvalidUrl(_)));
    }

    #[test]
    fn test_http_allowed_in_dev() {
        assert!(validate_webhook_url("http://example.com/hooks", true, false).is_ok());
    }

    #[test]
    fn test_invalid_url_format() {
        assert!(validate_webhook_url("not-a-url", false, false).is_err());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(validate_webhook_url("ftp://example.com/hooks", false, false).is_err());
    }

    #[test]
    fn test_blocks_loopback() {
        assert!(validate_host_not_internal("127.0.0.1").is_err());
    }

    #[test]
    fn test_blocks_private_ranges() {
        assert!(validate_host_not_internal("10.0.0.1").is_err());
        assert!(validate_host_not_internal("172.16.0.1").is_err());
        assert!(validate_host_not_internal("192.168.1.1").is_err());
    }

    #[test]
    fn test_blocks_metadata_endpoint() {
        assert!(validate_host_not_internal("169.254.169.254").is_err());
        assert!(validate_host_not_internal("metadata.google.internal").is_err());
    }

    #[test]
    fn test_blocks_localhost_names() {
        assert!(validate_host_not_internal("localhost").is_err());
        assert!(validate_host_not_internal("myhost.local").is_err());
    }

    #[test]
    fn test_allows_public_hosts() {
        assert!(validate_host_not_internal("8.8.8.8").is_ok());
        assert!(validate_host_not_internal("hooks.example.com").is_ok());
    }

    #[test]
    fn test_allow_internal_escape_hatch() {
        assert!(validate_webhook_url("http://127.0.0.1:9000/hook", true, true).is_ok());
    }

    #[test]
    fn test_normalize_empty_means_wildcard() {
        assert_eq!(normalize_event_list(None), vec!["*".to_string()]);
        assert_eq!(normalize_event_list(Some(vec![])), vec!["*".to_string()]);
    }

    #[test]
    fn test_normalize_wildcard_collapses() {
        let list = normalize_event_list(Some(vec![
            "content.published".to_string(),
            "*".to_string(),
        ]));
        assert_eq!(list, vec!["*".to_string()]);
    }

    #[test]
    fn test_normalize_trims_and_dedups() {
        let list = normalize_event_list(Some(vec![
            " content.published ".to_string(),
            "content.published".to_string(),
            "content.deleted".to_string(),
            "  ".to_string(),
        ]));
        assert_eq!(
            list,
            vec!["content.deleted".to_string(), "content.published".to_string()]
        );
    }
}
