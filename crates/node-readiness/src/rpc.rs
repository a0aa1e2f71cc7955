use crate::utils::{deserialize_hex_to_u64, parse_hex_u64, truncate_payload};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// How much of an unexpected payload is kept for the logs.
const MAX_LOGGED_PAYLOAD: usize = 512;

/// Failure of a single request against the node.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("failed to reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed response from {url}: {source} (payload: {payload})")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
        payload: String,
    },

    #[error("{method} failed with JSON-RPC error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} returned no result")]
    MissingResult { method: String },
}

impl RpcError {
    /// True when the node could not be reached at all, as opposed to
    /// answering with something unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Transport { .. })
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct Response {
    #[allow(dead_code)]
    jsonrpc: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// The fields of `eth_getBlockByNumber` the probe cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "deserialize_hex_to_u64")]
    pub number: u64,
    #[serde(deserialize_with = "deserialize_hex_to_u64")]
    pub timestamp: u64,
}

/// JSON-RPC/HTTP client bound to one node endpoint.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct NodeClient {
    url: Url,
    client: reqwest::Client,
}

impl NodeClient {
    pub fn new(url: Url, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to create HTTP client: {}", e))?;

        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issues a JSON-RPC 2.0 call and returns the untyped `result` member.
    pub async fn call_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = Request {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(self.url.as_str(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(self.url.as_str(), e))?;

        if !status.is_success() {
            return Err(RpcError::Status {
                url: self.url.to_string(),
                status,
            });
        }

        let envelope: Response = serde_json::from_str(&body).map_err(|source| RpcError::Decode {
            url: self.url.to_string(),
            source,
            payload: truncate_payload(&body, MAX_LOGGED_PAYLOAD),
        })?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        envelope.result.ok_or_else(|| RpcError::MissingResult {
            method: method.to_string(),
        })
    }

    /// Issues a JSON-RPC 2.0 call and decodes the `result` member into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.call_raw(method, params).await?;

        serde_json::from_value(result.clone()).map_err(|source| RpcError::Decode {
            url: self.url.to_string(),
            source,
            payload: truncate_payload(&result.to_string(), MAX_LOGGED_PAYLOAD),
        })
    }

    pub async fn client_version(&self) -> Result<String, RpcError> {
        self.call("web3_clientVersion", json!([])).await
    }

    pub async fn latest_block(&self) -> Result<BlockHeader, RpcError> {
        self.call("eth_getBlockByNumber", json!(["latest", false]))
            .await
    }

    pub async fn peer_count(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("net_peerCount", json!([])).await?;

        parse_hex_u64(&quantity).map_err(|reason| RpcError::Decode {
            url: self.url.to_string(),
            source: serde::de::Error::custom(reason),
            payload: quantity,
        })
    }

    /// Plain HTTP GET of `<endpoint>/<path>` decoded as JSON.
    ///
    /// Health endpoints report failures with a non-2xx status and a full
    /// document, so a body that decodes is returned whatever the status.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let url = format!("{}/{}", self.url.as_str().trim_end_matches('/'), path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(RpcError::Status { url, status }),
            Err(source) => Err(RpcError::Decode {
                url,
                source,
                payload: truncate_payload(&body, MAX_LOGGED_PAYLOAD),
            }),
        }
    }
}

fn transport_error(url: &str, source: reqwest::Error) -> RpcError {
    if source.is_timeout() {
        RpcError::Timeout {
            url: url.to_string(),
        }
    } else {
        RpcError::Transport {
            url: url.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn new_client(server: &MockServer) -> NodeClient {
        NodeClient::new(server.uri().parse().unwrap(), Duration::from_millis(500)).unwrap()
    }

    async fn mount_result(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_call_sends_jsonrpc_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "jsonrpc": "2.0",
                "method": "web3_clientVersion",
                "params": [],
                "id": 1,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "Nethermind/v1.25.4",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let version = new_client(&server).client_version().await.unwrap();
        assert_eq!(version, "Nethermind/v1.25.4");
    }

    #[tokio::test]
    async fn test_latest_block_decodes_hex_quantities() {
        let server = MockServer::start().await;
        mount_result(
            &server,
            "eth_getBlockByNumber",
            json!({ "number": "0x1b4", "timestamp": "0x65a0c1f3", "hash": "0xabc" }),
        )
        .await;

        let block = new_client(&server).latest_block().await.unwrap();
        assert_eq!(block.number, 436);
        assert_eq!(block.timestamp, 0x65a0c1f3);
    }

    #[tokio::test]
    async fn test_peer_count() {
        let server = MockServer::start().await;
        mount_result(&server, "net_peerCount", json!("0xc")).await;

        assert_eq!(new_client(&server).peer_count().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_peer_count_rejects_bad_quantity() {
        let server = MockServer::start().await;
        mount_result(&server, "net_peerCount", json!("twelve")).await;

        let err = new_client(&server).peer_count().await.unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = new_client(&server).client_version().await.unwrap_err();
        assert!(
            matches!(err, RpcError::Status { status, .. } if status.as_u16() == 502),
            "got {err:?}"
        );
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = new_client(&server).client_version().await.unwrap_err();
        match err {
            RpcError::Decode { payload, .. } => assert_eq!(payload, "<html>gateway</html>"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_result_type_mismatch() {
        let server = MockServer::start().await;
        mount_result(&server, "eth_getBlockByNumber", json!("0x1")).await;

        let err = new_client(&server).latest_block().await.unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_jsonrpc_error_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "the method net_peerCount does not exist" },
            })))
            .mount(&server)
            .await;

        let err = new_client(&server).peer_count().await.unwrap_err();
        assert!(
            matches!(err, RpcError::Rpc { code: -32601, ref method, .. } if method == "net_peerCount"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_null_result() {
        let server = MockServer::start().await;
        mount_result(&server, "eth_getBlockByNumber", Value::Null).await;

        let err = new_client(&server).latest_block().await.unwrap_err();
        assert!(matches!(err, RpcError::MissingResult { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = new_client(&server).latest_block().await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }), "got {err:?}");
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}").parse().unwrap();
        let client = NodeClient::new(url, Duration::from_millis(500)).unwrap();

        let err = client.client_version().await.unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_get_json_keeps_body_of_unhealthy_answer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "status": "Unhealthy" })))
            .mount(&server)
            .await;

        let body: Value = new_client(&server).get_json("health").await.unwrap();
        assert_eq!(body["status"], "Unhealthy");
    }

    #[tokio::test]
    async fn test_get_json_status_without_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = new_client(&server)
            .get_json::<Value>("health")
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Status { .. }), "got {err:?}");
    }
}
