//! Plain HTTP requests that ride on the browser's session: same cookies,
//! same user agent. Useful when an endpoint is cheaper to hit directly than
//! through page navigation.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use tracing::debug;
use webharvest_core::Driver;

use crate::driver::CdpDriver;
use crate::error::Result;

pub struct BridgedHttpClient {
    client: reqwest::Client,
}

impl BridgedHttpClient {
    /// Snapshot the driver's cookies and user agent into a reqwest client.
    /// The snapshot is taken once; refresh by building a new client after
    /// the page logs in or rotates its session.
    pub async fn from_driver(driver: &CdpDriver) -> Result<Self> {
        let user_agent = driver.user_agent().await?;
        let cookies = driver.cookies().await?;
        let cookie_header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        debug!(driver = %driver.id(), cookies = cookies.len(), "Bridging browser session");

        let mut headers = HeaderMap::new();
        if !cookie_header.is_empty() {
            headers.insert(COOKIE, HeaderValue::from_str(&cookie_header)?);
        }
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(url).send().await?.error_for_status()?)
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?)
    }
}
