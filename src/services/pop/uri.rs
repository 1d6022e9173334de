//! Resource URI decomposition for the SHR `u` / `p` / `q` claims.
//!
//! Values are sliced from the caller's text, never re-serialized: a verifier compares
//! them against the raw request line, so percent-encoding, dot-segment removal or
//! host lowercasing would break the binding.
use url::Url;

use crate::error::PopError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlComponents {
    // authority without userinfo, as written (port kept even when default)
    pub host_and_port: String,
    // path as written; `/` when the URI has none
    pub absolute_path: String,
    // text between the first `?` and any `#`, as written
    pub query_string: Option<String>,
}

/// Split an absolute URI into the components used by the SHR claim set.
pub fn url_components(uri: &str) -> Result<UrlComponents, PopError> {
    let raw = uri.trim();

    // Validation only.
    let url = Url::parse(raw).map_err(|e| PopError::url_parse(uri, e.to_string()))?;
    if url.host_str().is_none() {
        return Err(PopError::url_parse(uri, "missing host"));
    }

    let (_, rest) = raw
        .split_once("://")
        .ok_or_else(|| PopError::url_parse(uri, "missing authority"))?;
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);

    let (rest, query_string) = match rest.split_once('?') {
        Some((before, query)) => (before, Some(query.to_string())),
        None => (rest, None),
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let host_and_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let absolute_path = if path.is_empty() { "/" } else { path };

    Ok(UrlComponents {
        host_and_port: host_and_port.to_string(),
        absolute_path: absolute_path.to_string(),
        query_string,
    })
}
