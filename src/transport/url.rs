//! Connection target derivation.
//!
//! The WebSocket URL is derived from the page location (or its proxy
//! override): the scheme moves to the WebSocket family, query and fragment
//! are dropped, and the session identifier becomes the last path segment.
//!
//! ```text
//! http://127.0.0.1:8081/         + "abc"  →  ws://127.0.0.1:8081/abc/
//! https://example.com/app?x=1    + "abc"  →  wss://example.com/app/abc/
//! ```

use url::Url;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Builds the WebSocket URL for `config`.
///
/// # Errors
///
/// - [`Error::Config`] for an invalid session id or an unsupported scheme
/// - [`Error::Url`] if the base location does not parse
pub fn websocket_url(config: &SessionConfig) -> Result<Url> {
    config.validate()?;

    let mut url = Url::parse(config.base_url())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::config(format!(
                "cannot derive a WebSocket URL from scheme {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot switch {url} to {scheme}")))?;

    url.set_query(None);
    url.set_fragment(None);

    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(config.session_id());
    path.push('/');
    url.set_path(&path);

    Ok(url)
}
