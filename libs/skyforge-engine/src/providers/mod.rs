//! Remote execution providers used when the local sandbox is unreachable.
//!
//! Both speak plain HTTP through one shared `reqwest::Client`. No deadline
//! beyond the client's connect timeout is imposed here; callers own the
//! overall request budget.

pub mod judge0;
pub mod piston;

pub use judge0::Judge0Provider;
pub use piston::PistonProvider;

use std::time::Duration;

const USER_AGENT: &str = "SkyForge/1.0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the fallback providers
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;
    use tokio::net::TcpListener;

    /// Serve `app` on an ephemeral local port, returning its base URL
    pub async fn spawn_mock(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind mock server: {}", e));
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
