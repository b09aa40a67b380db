use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

const APP_USER_AGENT: &str = concat!("armaserver/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for catalog, changelog and SteamCMD bootstrap requests.
///
/// Every request is bounded by `timeout`; the workshop pages never stream, so
/// a whole-request deadline is enough.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .timeout(timeout)
        .build()
}
