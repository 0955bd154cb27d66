//! Token validation configuration.

use serde::{Deserialize, Serialize};

/// Settings for validating the access tokens presented on the WebSocket handshake.
///
/// Tokens are issued elsewhere; this layer only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the token issuer.
    #[serde(default = "default_secret")]
    pub jwt_secret: String,
    /// Expected `iss` claim. Not checked when unset.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Clock skew tolerance for `exp`, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_secret(),
            issuer: None,
            leeway_seconds: default_leeway(),
        }
    }
}

fn default_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_leeway() -> u64 {
    30
}
