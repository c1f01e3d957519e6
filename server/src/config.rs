use std::time::Duration;

pub const DEFAULT_SERVER_ID: &str = "8p75gb";
pub const DEFAULT_STATUS_URL_TEMPLATE: &str =
    "https://servers-frontend.fivem.net/api/servers/single/{server_id}";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const COUNTDOWN_TICK_SECS: u64 = 1;
pub const DEFAULT_ROSTER_REFRESH_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_FETCH_RETRY_ATTEMPTS: usize = 2;
pub const DEFAULT_FETCH_RETRY_BASE_MS: u64 = 500;
pub const FETCH_RETRY_MAX_DELAY_SECS: u64 = 5;
pub const SSE_KEEPALIVE_SECS: u64 = 15;
pub const DEFAULT_BROADCAST_BUFFER: usize = 64;
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const BODY_PREVIEW_CHARS: usize = 200;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_positive<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env_string(key)
        .and_then(|value| value.parse::<T>().ok())
        .filter(|value| *value > T::default())
}

pub fn server_id() -> String {
    env_string("SERVER_ID").unwrap_or_else(|| DEFAULT_SERVER_ID.to_string())
}

pub fn status_url_template() -> String {
    env_string("STATUS_URL_TEMPLATE").unwrap_or_else(|| DEFAULT_STATUS_URL_TEMPLATE.to_string())
}

/// Ordered status sources: mirrors first, then the canonical endpoint.
pub fn status_sources() -> Vec<String> {
    let server_id = server_id();
    let mut sources: Vec<String> = env_string("STATUS_MIRROR_URLS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(|url| url.replace("{server_id}", &server_id))
                .collect()
        })
        .unwrap_or_default();
    let canonical = status_url_template().replace("{server_id}", &server_id);
    if !sources.contains(&canonical) {
        sources.push(canonical);
    }
    sources
}

pub fn refresh_interval_secs() -> u64 {
    env_positive("REFRESH_INTERVAL_SECS").unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
}

pub fn roster_refresh_interval() -> Duration {
    Duration::from_secs(env_positive("ROSTER_REFRESH_SECS").unwrap_or(DEFAULT_ROSTER_REFRESH_SECS))
}

pub fn roster_path() -> Option<String> {
    env_string("ROSTER_PATH")
}

pub fn roster_csv_url() -> Option<String> {
    env_string("ROSTER_CSV_URL")
}

/// Retries after the first attempt, per source. Zero disables retrying.
pub fn fetch_retry_attempts() -> usize {
    env_string("FETCH_RETRY_ATTEMPTS")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_FETCH_RETRY_ATTEMPTS)
}

pub fn fetch_retry_base_delay() -> Duration {
    Duration::from_millis(env_positive("FETCH_RETRY_BASE_MS").unwrap_or(DEFAULT_FETCH_RETRY_BASE_MS))
}

pub fn server_port() -> u16 {
    env_positive("PORT").unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn sse_broadcast_buffer() -> usize {
    env_positive("SSE_BROADCAST_BUFFER").unwrap_or(DEFAULT_BROADCAST_BUFFER)
}

pub fn upstream_http_timeout() -> Duration {
    Duration::from_secs(
        env_positive("UPSTREAM_HTTP_TIMEOUT_SECS").unwrap_or(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS),
    )
}

pub fn upstream_connect_timeout() -> Duration {
    Duration::from_secs(
        env_positive("UPSTREAM_CONNECT_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
    )
}
