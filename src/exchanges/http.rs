use std::time::Duration;

/// Shared `reqwest::Client` builder for every venue adapter — pooled
/// connections and a fixed request timeout, matching the teacher's
/// `ClobClient::new` HTTP client configuration.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
}
