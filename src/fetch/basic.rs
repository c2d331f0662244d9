use std::time::Duration;

use async_trait::async_trait;

use super::client::HttpClient;

/// Plain [`HttpClient`] over a shared [`reqwest::Client`] with conservative
/// timeouts. Network documents can reach tens of megabytes, so the overall
/// timeout is well above the connect timeout.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
