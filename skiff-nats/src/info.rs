//! JSON documents exchanged in the handshake.

use serde::{Deserialize, Serialize};
use skiff_core::options::ConnectOptions;

/// Client options sent with `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub verbose: bool,
    pub pedantic: bool,
    pub ssl_required: bool,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub version: String,
}

impl ConnectInfo {
    /// Build the CONNECT document; credentials come from the URL, if any.
    pub fn from_options(options: &ConnectOptions) -> Self {
        let (user, pass) = match options.url.credentials() {
            Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
            None => (None, None),
        };
        Self {
            verbose: options.verbose,
            pedantic: options.pedantic,
            ssl_required: options.ssl_required,
            name: options.name.clone(),
            user,
            pass,
            lang: "rust".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Broker description received in `INFO`.
///
/// Unknown keys are ignored; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub server_id: String,
    pub server_name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub proto: u32,
    pub max_payload: Option<usize>,
    pub auth_required: bool,
    pub tls_required: bool,
    pub headers: bool,
}
