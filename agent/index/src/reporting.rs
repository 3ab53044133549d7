use crate::Error;
use reqwest::{Method, Url};
use std::time::Duration;

const ONBOARDING_STATUS: &str = "/api/v1/onboarding/status";
const SYNC_COMPLETE: &str = "/api/v1/agent/sync-complete";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The control-plane API the agent checks in with.
#[async_trait::async_trait]
pub trait ReportingApi: Send + Sync + 'static {
    /// Succeeds when the API accepts this agent's key.
    async fn onboarding_status(&self) -> Result<(), Error>;

    /// Notifies the API that a cycle finished.
    async fn sync_complete(&self) -> Result<(), Error>;
}

#[derive(Clone, Debug)]
pub struct HttpReportingApi {
    client: reqwest::Client,
    base: String,
    api_key: String,
}

// === impl HttpReportingApi ===

impl HttpReportingApi {
    pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self, Error> {
        let base = normalize_url(url)?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            base,
            api_key: api_key.into(),
        })
    }

    async fn call(&self, method: Method, path: &str) -> Result<(), Error> {
        let rsp = self
            .client
            .request(method.clone(), format!("{}{path}", self.base))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = rsp.status();
        if status != reqwest::StatusCode::OK {
            let body = rsp.text().await.unwrap_or_default();
            return Err(Error::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportingApi for HttpReportingApi {
    async fn onboarding_status(&self) -> Result<(), Error> {
        self.call(Method::GET, ONBOARDING_STATUS).await
    }

    async fn sync_complete(&self) -> Result<(), Error> {
        self.call(Method::POST, SYNC_COMPLETE).await
    }
}

/// Parses a base URL, assuming `https` when no scheme is given.
fn normalize_url(url: &str) -> Result<String, Error> {
    let url = url.trim().trim_end_matches('/');
    let url = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    match Url::parse(&url) {
        Ok(parsed) if parsed.has_host() => Ok(url),
        _ => Err(Error::InvalidUrl(url)),
    }
}
