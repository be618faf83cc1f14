//! Channel URL derivation

use url::Url;

use crate::error::{ClientError, Result};

/// Fixed upgrade path served by the gateway
pub const CHANNEL_PATH: &str = "/ws";

/// Derive the chat channel URL from a page origin.
///
/// `https` maps to `wss` and `http` to `ws`; host and port are kept, and
/// any path, query or fragment on the origin is replaced by `/ws`.
pub fn channel_url(origin: &str) -> Result<String> {
    let invalid = |reason: String| ClientError::InvalidOrigin {
        origin: origin.to_string(),
        reason,
    };

    let mut url = Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch to '{}'", scheme)))?;
    url.set_path(CHANNEL_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
