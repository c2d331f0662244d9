use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam over HTTP execution so document and snapshot fetches can be stubbed
/// in tests without a live server.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
