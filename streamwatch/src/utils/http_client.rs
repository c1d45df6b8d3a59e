//! Shared `reqwest` client construction.

use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("streamwatch/", env!("CARGO_PKG_VERSION"));

/// reqwest is built without a bundled crypto provider; install aws-lc-rs once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client with a whole-request timeout.
///
/// A zero `request_timeout` leaves requests unbounded.
pub fn build_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(error = %error, "Failed to build HTTP client; falling back to reqwest defaults");
        reqwest::Client::new()
    })
}
