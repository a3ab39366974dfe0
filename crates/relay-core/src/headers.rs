//! Cache and optimization control headers.
//!
//! The HTTP transport is an external collaborator; these typed helpers are
//! the only contract it needs. Inbound headers parse into [`CacheControl`]
//! and [`OptimizeLevel`]; outbound diagnostics render as `(name, value)`
//! pairs.

use crate::response::CacheStatus;
use std::time::Duration;

/// `X-AIHub-Cache`: whether the caller allows cache use.
pub const HEADER_CACHE: &str = "X-AIHub-Cache";
/// `X-AIHub-Cache-TTL`: caller TTL override, in seconds.
pub const HEADER_CACHE_TTL: &str = "X-AIHub-Cache-TTL";
/// `X-AIHub-Optimize`: cost optimization aggressiveness.
pub const HEADER_OPTIMIZE: &str = "X-AIHub-Optimize";
/// `X-AIHub-Cache-Status`: cache outcome, on responses.
pub const HEADER_CACHE_STATUS: &str = "X-AIHub-Cache-Status";
/// `X-AIHub-Optimizations-Applied`: optimizations applied, on responses.
pub const HEADER_OPTIMIZATIONS_APPLIED: &str = "X-AIHub-Optimizations-Applied";
/// `X-AIHub-Cost`: actual cost, on responses.
pub const HEADER_COST: &str = "X-AIHub-Cost";

/// Cache participation requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Participate in the response cache
    #[default]
    Use,
    /// Skip the cache for this request
    Bypass,
}

/// Parsed cache control for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Whether the cache participates
    pub mode: CacheMode,
    /// Caller TTL override
    pub ttl_override: Option<Duration>,
}

impl CacheControl {
    /// Parse from the `X-AIHub-Cache` and `X-AIHub-Cache-TTL` header values.
    ///
    /// Unrecognized values fall back to the default (`use`, no override) so a
    /// malformed header never fails a request.
    #[must_use]
    pub fn from_headers(cache: Option<&str>, ttl: Option<&str>) -> Self {
        let mode = match cache.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("bypass") => CacheMode::Bypass,
            _ => CacheMode::Use,
        };
        let ttl_override = ttl
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Self { mode, ttl_override }
    }

    /// True when the caller asked to skip the cache.
    #[must_use]
    pub fn is_bypass(&self) -> bool {
        self.mode == CacheMode::Bypass
    }
}

/// Cost optimization aggressiveness requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimizeLevel {
    /// Honor the preferred model without substitution
    Off,
    /// Balance cost against advertised latency
    #[default]
    Moderate,
    /// Minimize cost among eligible candidates
    Aggressive,
}

impl OptimizeLevel {
    /// Parse from the `X-AIHub-Optimize` header value.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("off") => Self::Off,
            Some(v) if v.eq_ignore_ascii_case("aggressive") => Self::Aggressive,
            _ => Self::Moderate,
        }
    }

    /// Stable string form for the response header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

/// Render the response diagnostic headers.
#[must_use]
pub fn response_headers(
    cache_status: CacheStatus,
    optimizations: &[&str],
    cost: &str,
) -> Vec<(&'static str, String)> {
    vec![
        (HEADER_CACHE_STATUS, cache_status.as_str().to_string()),
        (HEADER_OPTIMIZATIONS_APPLIED, optimizations.join(",")),
        (HEADER_COST, cost.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_parsing() {
        let bypass = CacheControl::from_headers(Some("bypass"), None);
        assert!(bypass.is_bypass());

        let with_ttl = CacheControl::from_headers(Some("use"), Some("300"));
        assert_eq!(with_ttl.mode, CacheMode::Use);
        assert_eq!(with_ttl.ttl_override, Some(Duration::from_secs(300)));

        // Malformed values never fail the request
        let garbage = CacheControl::from_headers(Some("???"), Some("not-a-number"));
        assert_eq!(garbage.mode, CacheMode::Use);
        assert!(garbage.ttl_override.is_none());
    }

    #[test]
    fn test_optimize_level_parsing() {
        assert_eq!(OptimizeLevel::from_header(Some("off")), OptimizeLevel::Off);
        assert_eq!(
            OptimizeLevel::from_header(Some("AGGRESSIVE")),
            OptimizeLevel::Aggressive
        );
        assert_eq!(OptimizeLevel::from_header(None), OptimizeLevel::Moderate);
    }

    #[test]
    fn test_response_headers() {
        let headers = response_headers(CacheStatus::Hit, &["downgrade"], "0.000125");
        assert_eq!(headers[0], (HEADER_CACHE_STATUS, "hit".to_string()));
        assert_eq!(headers[2].1, "0.000125");
    }
}
