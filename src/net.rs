// src/net.rs
//! Per-call `reqwest` clients. Proxy routing is always explicit: either the
//! configured proxy or none at all, never the process environment.

use reqwest::{Client, Proxy};
use std::time::Duration;

/// Build a client for one request chain.
///
/// `proxy = None` disables proxying entirely (including `HTTP(S)_PROXY`).
pub(crate) fn http_client(
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let builder = Client::builder().timeout(timeout);
    let builder = match proxy.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => builder.proxy(Proxy::all(p)?),
        None => builder.no_proxy(),
    };
    builder.build()
}

/// Render an error with its `source()` chain, e.g.
/// `feed request failed: error sending request: operation timed out`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        let msg = e.to_string();
        if !msg.is_empty() && !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        cur = e.source();
    }
    out
}
