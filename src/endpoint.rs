//! Realtime endpoint derivation
//!
//! The realtime server runs on the same host as the REST API, on a fixed
//! alternate port. Given the API base URL we swap the port, switch to the
//! WebSocket scheme and point at the Socket.IO path.

use url::Url;

use crate::error::RealtimeError;

/// Socket.IO path served by the realtime server
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Query selecting Engine.IO v4 over a direct WebSocket upgrade
pub const SOCKET_IO_QUERY: &str = "EIO=4&transport=websocket";

/// Derive the realtime WebSocket URL from the REST API base URL.
pub fn socket_url_from_api(api_base: &str, socket_port: u16) -> Result<Url, RealtimeError> {
    let mut url = Url::parse(api_base)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(RealtimeError::Config(format!(
                "Unsupported API scheme '{}'",
                other
            )))
        }
    };

    if url.host_str().is_none() {
        return Err(RealtimeError::Config(format!("API URL has no host: {}", api_base)));
    }

    url.set_scheme(scheme)
        .map_err(|_| RealtimeError::Config(format!("Cannot use scheme {} for {}", scheme, api_base)))?;
    url.set_port(Some(socket_port))
        .map_err(|_| RealtimeError::Config(format!("Cannot set port on {}", api_base)))?;
    url.set_path(SOCKET_IO_PATH);
    url.set_query(Some(SOCKET_IO_QUERY));
    url.set_fragment(None);

    Ok(url)
}
