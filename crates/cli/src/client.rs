// HTTP client for the roomsync server.
//
// The server URL and bearer token come from flags or `ROOMSYNC_URL` /
// `ROOMSYNC_TOKEN`. Error envelopes are decoded into `ApiFailure` so the
// exit code can follow the server's error code.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A non-2xx response from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server returned {} {}: {}", self.status, self.code, self.message)?;
        if self.retryable {
            write!(f, " (retryable)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiFailure {}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    retryable: bool,
}

#[derive(Debug)]
pub struct ServerClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl ServerClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid server url `{base_url}`"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;

        Ok(Self { http, base_url, token: token.filter(|token| !token.trim().is_empty()) })
    }

    /// Resolve connection settings: explicit flags win over the environment.
    pub fn from_flags(url: Option<String>, token: Option<String>) -> Result<Self> {
        Self::from_flags_with_env(url, token, |key| std::env::var(key).ok())
    }

    fn from_flags_with_env<F>(url: Option<String>, token: Option<String>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = url
            .or_else(|| env("ROOMSYNC_URL"))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let token = token.or_else(|| env("ROOMSYNC_TOKEN"));
        Self::new(&url, token)
    }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut request = self.http.post(url.clone()).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response =
            request.send().await.with_context(|| format!("failed to reach server at {url}"))?;
        let status = response.status();
        let bytes = response.bytes().await.context("failed to read server response")?;

        if !status.is_success() {
            return Err(decode_failure(status.as_u16(), &bytes).into());
        }

        serde_json::from_slice(&bytes).context("failed to decode server response")
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path.trim_start_matches('/')).context("failed to build request url")
    }
}

fn decode_failure(status: u16, body: &[u8]) -> ApiFailure {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => ApiFailure {
            status,
            code: error.code,
            message: error.message,
            retryable: error.retryable,
        },
        Err(_) => ApiFailure {
            status,
            code: "HTTP_ERROR".to_string(),
            message: String::from_utf8_lossy(body).chars().take(300).collect(),
            retryable: status >= 500,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn one_shot_server(
        status_line: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept should succeed");
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let read = stream.read(&mut buf).await.expect("request should be readable");
                request.extend_from_slice(&buf[..read]);
                if read == 0 || request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.expect("response write should succeed");
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{addr}/"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    #[tokio::test]
    async fn posts_json_with_bearer_token() {
        let (url, server) =
            one_shot_server("200 OK", json!({ "success": true, "roomId": "tracker-a-wiki" }).to_string())
                .await;

        let client = ServerClient::new(&url, Some("token-123".into())).unwrap();
        let result: Value =
            client.post("/v1/rooms/delete", &json!({ "issueId": "x" })).await.unwrap();
        assert_eq!(result["roomId"], "tracker-a-wiki");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/rooms/delete HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer token-123"));
        assert!(request.contains("\"issueId\":\"x\""));
    }

    #[tokio::test]
    async fn error_envelopes_become_api_failures() {
        let body = json!({
            "error": {
                "code": "AUTH_FORBIDDEN",
                "message": "room is outside the caller's grant scope",
                "retryable": false,
                "request_id": "req-1",
                "details": {}
            }
        })
        .to_string();
        let (url, _server) = one_shot_server("403 Forbidden", body).await;

        let client = ServerClient::new(&url, None).unwrap();
        let error = client.post::<_, Value>("v1/rooms/resync", &json!({})).await.unwrap_err();
        let failure = error.downcast_ref::<ApiFailure>().expect("typed failure");
        assert_eq!(failure.status, 403);
        assert_eq!(failure.code, "AUTH_FORBIDDEN");
        assert!(!failure.retryable);
    }

    #[test]
    fn non_envelope_errors_keep_status() {
        let failure = decode_failure(502, b"bad gateway");
        assert_eq!(failure.code, "HTTP_ERROR");
        assert_eq!(failure.message, "bad gateway");
        assert!(failure.retryable);
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> =
            [("ROOMSYNC_URL", "http://sync.internal:9090/"), ("ROOMSYNC_TOKEN", "from-env")]
                .into_iter()
                .collect();
        let lookup = |key: &str| env.get(key).map(|value| value.to_string());

        let client = ServerClient::from_flags_with_env(None, None, lookup).unwrap();
        assert_eq!(client.base_url.as_str(), "http://sync.internal:9090/");
        assert_eq!(client.token.as_deref(), Some("from-env"));

        let client = ServerClient::from_flags_with_env(
            Some("http://localhost:1234".into()),
            Some("flag".into()),
            lookup,
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:1234/");
        assert_eq!(client.token.as_deref(), Some("flag"));
    }

    #[test]
    fn defaults_without_environment() {
        let client = ServerClient::from_flags_with_env(None, None, |_| None).unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:8080/");
        assert!(client.token.is_none());
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(ServerClient::new("not a url", None).is_err());
    }
}
