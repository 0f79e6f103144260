use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("character-reference-studio/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client")
});

/// Shared client; callers set a per-request timeout for long generations.
pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
