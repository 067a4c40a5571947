//! Settings loader: assembles `Settings` once at process start from
//! environment variables, with the defaults enumerated in the protocol
//! reference this edge node implements.

use crate::error::{Error, Result};
use std::time::Duration;
use uuid::Uuid;

/// Relay pump scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayScheduler {
    Pipe,
    Yield,
}

impl RelayScheduler {
    fn parse(raw: &str) -> Self {
        match raw {
            "yield" => RelayScheduler::Yield,
            // unknown values fall back to pipe
            _ => RelayScheduler::Pipe,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub uuid: Option<[u8; 16]>,
    pub proxy: Vec<String>,
    pub ws_path: Option<String>,
    pub xhttp_path: Option<String>,
    pub doh_query_path: Option<String>,
    pub ip_query_path: Option<String>,
    /// High-water mark in bytes for internal byte queues; `None` disables
    /// bounded queuing (unbounded channel).
    pub buffer_size: Option<usize>,
    pub xpadding_range: Option<(u32, u32)>,
    pub relay_scheduler: RelayScheduler,
    pub yield_size: usize,
    pub yield_delay: Duration,
    pub upstream_doh: String,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let uuid = match env_str("UUID") {
            Some(s) if !s.is_empty() => Some(parse_uuid(&s)?),
            _ => None,
        };

        let proxy = parse_proxy_list(env_str("PROXY").unwrap_or_default().as_str());

        let buffer_size = match env_u64("BUFFER_SIZE", 128) {
            0 => None,
            kib => Some((kib as usize) * 1024),
        };

        let xpadding_range = parse_xpadding_range(
            &env_str("XPADDING_RANGE").unwrap_or_else(|| "100-1000".to_string()),
        );

        let relay_scheduler =
            RelayScheduler::parse(&env_str("RELAY_SCHEDULER").unwrap_or_else(|| "pipe".to_string()));

        let yield_size = (env_u64("YIELD_SIZE", 2048) as usize) * 1024;
        let yield_delay = Duration::from_millis(env_u64("YIELD_DELAY", 0));

        Ok(Settings {
            uuid,
            proxy,
            ws_path: normalize_path(env_str("WS_PATH")),
            xhttp_path: normalize_path(env_str("XHTTP_PATH")),
            doh_query_path: normalize_path(env_str("DOH_QUERY_PATH")),
            ip_query_path: normalize_path(env_str("IP_QUERY_PATH")),
            buffer_size,
            xpadding_range,
            relay_scheduler,
            yield_size,
            yield_delay,
            upstream_doh: env_str("UPSTREAM_DOH")
                .unwrap_or_else(|| "https://dns.google/dns-query".to_string()),
            log_level: env_str("LOG_LEVEL").unwrap_or_else(|| "none".to_string()),
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_uuid(raw: &str) -> Result<[u8; 16]> {
    let parsed = Uuid::parse_str(raw).map_err(|e| Error::config(format!("invalid UUID: {e}")))?;
    Ok(*parsed.as_bytes())
}

/// Splits a fallback relay host list on space, comma, CR, or LF, discarding
/// empties.
fn parse_proxy_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ' ' || c == ',' || c == '\r' || c == '\n')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Non-empty path settings are normalized to end with `/`.
fn normalize_path(raw: Option<String>) -> Option<String> {
    raw.map(|mut s| {
        if !s.ends_with('/') {
            s.push('/');
        }
        s
    })
}

/// Parses `"min-max"`; malformed input or `"0"` disables padding.
pub(crate) fn parse_xpadding_range(raw: &str) -> Option<(u32, u32)> {
    if raw == "0" {
        return None;
    }
    let (lo, hi) = raw.split_once('-')?;
    let lo: u32 = lo.parse().ok()?;
    let hi: u32 = hi.parse().ok()?;
    if lo < 1 || lo > hi {
        return None;
    }
    Some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_list_splits_on_any_separator() {
        let got = parse_proxy_list("a, b\nc\r d,,");
        assert_eq!(got, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_parse_proxy_list_empty() {
        assert!(parse_proxy_list("").is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Some("/ws".into())), Some("/ws/".into()));
        assert_eq!(normalize_path(Some("/ws/".into())), Some("/ws/".into()));
        assert_eq!(normalize_path(None), None);
    }

    #[test]
    fn test_xpadding_range_parses() {
        assert_eq!(parse_xpadding_range("100-1000"), Some((100, 1000)));
    }

    #[test]
    fn test_xpadding_range_zero_disables() {
        assert_eq!(parse_xpadding_range("0"), None);
    }

    #[test]
    fn test_xpadding_range_malformed_disables() {
        assert_eq!(parse_xpadding_range("bogus"), None);
        assert_eq!(parse_xpadding_range("500-100"), None);
    }

    #[test]
    fn test_relay_scheduler_unknown_falls_back_to_pipe() {
        assert_eq!(RelayScheduler::parse("bogus"), RelayScheduler::Pipe);
        assert_eq!(RelayScheduler::parse("yield"), RelayScheduler::Yield);
    }
}
