use crate::{Credentials, Error, EvictionQuery, ItemResult, SearchBackend};
use reqwest::{header::CONTENT_TYPE, Method, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio::time;

/// Writes to an Elasticsearch-compatible backend over HTTP.
#[derive(Clone, Debug)]
pub struct ElasticBackend {
    client: reqwest::Client,
    base: String,
    credentials: Credentials,
    backoff: Backoff,
}

/// Controls how failed requests are retried.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
    pub retries: u32,
}

const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Bounds each attempt, including reading the response body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const JSON: &str = "application/json";
const NDJSON: &str = "application/x-ndjson";

// === impl ElasticBackend ===

impl ElasticBackend {
    pub fn new(
        url: &str,
        credentials: Credentials,
        insecure_skip_tls_verify: bool,
        backoff: Backoff,
    ) -> Result<Self, Error> {
        let base = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
            credentials,
            backoff,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> Result<Value, Error> {
        let url = format!("{}{path}", self.base);
        let mut attempt = 0;
        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .basic_auth(self.credentials.username(), Some(self.credentials.password()));
            if let Some((content_type, body)) = &body {
                req = req.header(CONTENT_TYPE, *content_type).body(body.clone());
            }

            let res = req.send().await;
            let retry = match &res {
                Ok(rsp) => RETRY_STATUSES.contains(&rsp.status()),
                Err(error) => !error.is_builder(),
            };
            if retry && attempt < self.backoff.retries {
                let delay = self.backoff.delay(attempt);
                match &res {
                    Ok(rsp) => tracing::debug!(%method, %path, status = %rsp.status(), ?delay, "Retrying"),
                    Err(error) => tracing::debug!(%method, %path, %error, ?delay, "Retrying"),
                }
                time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let rsp = res?;
            let status = rsp.status();
            if !status.is_success() {
                let body = rsp.text().await.unwrap_or_default();
                return Err(Error::Status {
                    method,
                    path: path.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(rsp.json().await?);
        }
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value, Error> {
        let body = serde_json::to_vec(body)?;
        self.send(method, path, Some((JSON, body))).await
    }
}

#[async_trait::async_trait]
impl SearchBackend for ElasticBackend {
    async fn info(&self) -> Result<Value, Error> {
        self.send(Method::GET, "/", None).await
    }

    async fn cluster_health(&self) -> Result<Value, Error> {
        self.send(Method::GET, "/_cluster/health", None).await
    }

    async fn index(&self, index: &str, doc: Value) -> Result<(), Error> {
        self.send_json(Method::POST, &format!("/{index}/_doc"), &doc)
            .await?;
        Ok(())
    }

    async fn bulk(&self, index: &str, docs: Vec<Value>) -> Result<Vec<ItemResult>, Error> {
        let n = docs.len();
        let body = encode_bulk(&docs)?;
        let rsp = self
            .send(Method::POST, &format!("/{index}/_bulk"), Some((NDJSON, body)))
            .await?;
        Ok(decode_bulk(&rsp, n))
    }

    async fn delete_stale(&self, index: &str, query: &EvictionQuery) -> Result<u64, Error> {
        let rsp = self
            .send_json(
                Method::POST,
                &format!("/{index}/_delete_by_query"),
                &query.to_json(),
            )
            .await?;
        Ok(rsp.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }
}

/// Encodes documents as NDJSON index actions.
fn encode_bulk(docs: &[Value]) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    for doc in docs {
        body.extend_from_slice(crate::bulk::ACTION_LINE.as_bytes());
        serde_json::to_writer(&mut body, doc)?;
        body.push(b'\n');
    }
    Ok(body)
}

/// Extracts per-document outcomes from a bulk response.
fn decode_bulk(rsp: &Value, n: usize) -> Vec<ItemResult> {
    let items = rsp
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    (0..n)
        .map(|i| {
            let Some(item) = items.get(i).and_then(|item| item.get("index")) else {
                return Err("missing from bulk response".to_string());
            };
            if let Some(error) = item.get("error") {
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| error.to_string());
                return Err(reason);
            }
            match item.get("status").and_then(Value::as_u64) {
                Some(status) if status >= 300 => Err(format!("status {status}")),
                _ => Ok(()),
            }
        })
        .collect()
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 1.5,
            max: Duration::from_secs(60),
            retries: 5,
        }
    }
}

impl Backoff {
    /// The delay before the retry following `attempt` failed attempts.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.initial.mul_f64(self.factor.powi(exp)).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Reply, TestServer};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mk_backend(server: &TestServer, backoff: Backoff) -> ElasticBackend {
        let creds = "org:pw".parse().unwrap();
        ElasticBackend::new(&server.url, creds, false, backoff).unwrap()
    }

    fn fast_backoff() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            ..Backoff::default()
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_millis(750));
        assert_eq!(backoff.delay(2), Duration::from_millis(1125));
        assert_eq!(backoff.delay(20), Duration::from_secs(60));
    }

    #[test]
    fn encodes_ndjson() {
        let body = encode_bulk(&[json!({"a": "agent"}), json!({"b": 1})]).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "{\"index\":{}}\n{\"a\":\"agent\"}\n{\"index\":{}}\n{\"b\":1}\n"
        );
    }

    #[test]
    fn decodes_item_outcomes() {
        let rsp = json!({
            "errors": true,
            "items": [
                {"index": {"status": 201}},
                {"index": {"status": 400, "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [rawSpec]"}}},
                {"index": {"status": 429}},
            ]
        });
        assert_eq!(
            decode_bulk(&rsp, 4),
            vec![
                Ok(()),
                Err("failed to parse field [rawSpec]".to_string()),
                Err("status 429".to_string()),
                Err("missing from bulk response".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn retries_unavailable_backend() {
        let server = TestServer::spawn(vec![
            Reply::Status(503, "{}"),
            Reply::Status(200, r#"{"version":{"number":"8.13.0"}}"#),
        ])
        .await;
        let info = mk_backend(&server, fast_backoff()).info().await.unwrap();
        assert_eq!(info["version"]["number"], "8.13.0");
        assert_eq!(server.requests(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let server = TestServer::spawn(vec![Reply::Status(503, "unavailable")]).await;
        let backoff = fast_backoff();
        let res = mk_backend(&server, backoff).cluster_health().await;
        match res {
            Err(Error::Status {
                method,
                path,
                status,
                body,
            }) => {
                assert_eq!(method, Method::GET);
                assert_eq!(path, "/_cluster/health");
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            res => panic!("unexpected result: {res:?}"),
        }
        assert_eq!(server.requests(), 1 + backoff.retries as usize);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = TestServer::spawn(vec![Reply::Status(401, "{}")]).await;
        let res = mk_backend(&server, fast_backoff())
            .index("collie-k8s-org", json!({"a": "agent"}))
            .await;
        assert!(matches!(res, Err(Error::Status { status: 401, .. })));
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_requests_time_out() {
        let server = TestServer::spawn(vec![Reply::Hang]).await;
        let backoff = Backoff::default();
        let res = mk_backend(&server, backoff).info().await;
        match res {
            Err(Error::Http(error)) => assert!(error.is_timeout(), "{error}"),
            res => panic!("unexpected result: {res:?}"),
        }
        assert_eq!(server.requests(), 1 + backoff.retries as usize);
    }

    #[test]
    fn rejects_invalid_urls() {
        let creds = "org:pw".parse().unwrap();
        assert!(matches!(
            ElasticBackend::new("not a url", creds, false, Backoff::default()),
            Err(Error::InvalidUrl(_))
        ));
    }
}
