//! JSON-RPC over HTTP towards client-provided endpoints (bundler, paymaster, node).
//!
//! Every call is a fresh request: nothing is cached, retried or timed out here. A hung
//! endpoint hangs the awaiting task until the transport errors or the caller drops the future.

use std::net::IpAddr;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `eth_*` user operation methods of ERC-4337 bundlers.
pub mod bundler;

/// ERC-7677 and vendor paymaster methods.
pub mod paymaster;

/// Account state reads.
pub mod provider;

pub use bundler::{BundlerClient, UserOperationByHash, UserOperationReceipt};
pub use paymaster::{GasPriceTiers, PaymasterClient, PaymasterContext, TokenQuote};
pub use provider::{ProviderError, RpcSafeProvider, SafeProvider};

/// JSON-RPC request ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric ID
    Number(u64),
    /// String ID
    String(String),
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    id: Id,
    method: &'a str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    error: Option<ErrorPayload>,
    // `Some(Value::Null)` for `"result": null`, `None` when the field is absent
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Parses a client-provided bundler, paymaster or node endpoint.
///
/// Plain `http://` is only accepted towards loopback (a local bundler or devnet node).
pub(crate) fn endpoint_url(url: &str) -> Result<reqwest::Url, RpcError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| RpcError::InvalidUrl {
        error_message: format!("malformed endpoint: {e}"),
    })?;

    let host = parsed.host_str().unwrap_or_default().to_string();
    let loopback = host == "localhost"
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback());

    let scheme = parsed.scheme().to_string();
    match scheme.as_str() {
        "https" => Ok(parsed),
        "http" if loopback => Ok(parsed),
        "http" => Err(RpcError::InvalidUrl {
            error_message: format!("endpoint {host} must use https://"),
        }),
        scheme => Err(RpcError::InvalidUrl {
            error_message: format!("endpoint scheme {scheme}:// is not supported"),
        }),
    }
}

/// A JSON-RPC endpoint.
///
/// Only the host is ever logged, since provider URLs commonly embed API keys.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    url: reqwest::Url,
    host: String,
    client: reqwest::Client,
}

impl JsonRpcClient {
    /// Creates a client for `url`.
    ///
    /// # Errors
    /// - `RpcError::InvalidUrl` if the URL is malformed or not `https://` (loopback excepted).
    /// - `RpcError::HttpError` if the HTTP client cannot be built.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let url = endpoint_url(url)?;
        let host = url.host_str().unwrap_or("<unknown>").to_string();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RpcError::HttpError(e.to_string()))?;
        Ok(Self { url, host, client })
    }

    /// Host of the endpoint, safe to log.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Calls `method` with `params` and deserializes the `result` field.
    ///
    /// A JSON `null` result deserializes into `R`, so pending lookups can be modelled as
    /// `Option<_>`.
    ///
    /// # Errors
    /// - `RpcError::HttpError` on transport failures or non-2xx statuses.
    /// - `RpcError::RpcResponseError` when the endpoint answers with an `error` object.
    /// - `RpcError::JsonError` / `RpcError::InvalidResponse` when the payload is malformed.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Id::Number(u64::from(rand::random::<u32>())),
            method,
            params,
        };
        let body = serde_json::to_vec(&request).map_err(|e| RpcError::JsonError {
            message: e.to_string(),
        })?;

        crate::debug!("rpc.request method={method} host={}", self.host);

        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            // strip the url, it may carry an API key
            .map_err(|e| RpcError::HttpError(e.without_url().to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::HttpError(e.without_url().to_string()))?;

        if !status.is_success() {
            crate::warn!(
                "rpc.http_error method={method} host={} status={status}",
                self.host
            );
            return Err(RpcError::HttpError(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }

        let result = response_result(&bytes).inspect_err(|e| {
            crate::warn!("rpc.error method={method} host={} error={e}", self.host);
        })?;

        serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse {
            error_message: format!("unexpected result for {method}: {e}"),
        })
    }
}

/// The `result` of a response body, or its `error` object as [`RpcError::RpcResponseError`].
fn response_result(body: &[u8]) -> Result<Value, RpcError> {
    let response: JsonRpcResponse =
        serde_json::from_slice(body).map_err(|e| RpcError::JsonError {
            message: e.to_string(),
        })?;

    match response {
        JsonRpcResponse {
            error: Some(error), ..
        } => Err(RpcError::RpcResponseError {
            code: error.code,
            error_message: error.message,
        }),
        JsonRpcResponse {
            result: Some(result),
            ..
        } => Ok(result),
        JsonRpcResponse { .. } => Err(RpcError::InvalidResponse {
            error_message: "response carries neither a result nor an error".to_string(),
        }),
    }
}

/// Errors that can occur when talking to a JSON-RPC endpoint.
#[crate::safe4337_error]
pub enum RpcError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// JSON (de)serialization error
    #[error("JSON parsing error: {message}")]
    JsonError {
        /// Parser error.
        message: String,
    },

    /// The endpoint returned an error response
    #[error("RPC error {code}: {error_message}")]
    RpcResponseError {
        /// The error code from the RPC response
        code: i64,
        /// The error message from the RPC response
        error_message: String,
    },

    /// Invalid response format
    #[error("Invalid response format: {error_message}")]
    InvalidResponse {
        /// The error message describing the format issue
        error_message: String,
    },

    /// Endpoint URL rejected
    #[error("Invalid RPC URL: {error_message}")]
    InvalidUrl {
        /// Why the URL was rejected
        error_message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_bundlers_and_paymasters_are_accepted() {
        assert!(endpoint_url("https://api.pimlico.io/v2/11155111/rpc?apikey=abc").is_ok());
        assert!(endpoint_url("https://public.stackup.sh/api/v1/node/ethereum-sepolia").is_ok());
    }

    #[test]
    fn test_local_bundler_may_use_plain_http() {
        assert!(endpoint_url("http://localhost:4337/rpc").is_ok());
        assert!(endpoint_url("http://127.0.0.1:8545").is_ok());
        assert!(endpoint_url("http://127.0.0.2:3000").is_ok());
        assert!(endpoint_url("http://[::1]:4337").is_ok());
    }

    #[test]
    fn test_remote_plain_http_names_the_host() {
        let err = endpoint_url("http://bundler.example.com/rpc").unwrap_err();
        assert!(
            matches!(err, RpcError::InvalidUrl { ref error_message } if error_message.contains("bundler.example.com"))
        );
        assert!(endpoint_url("http://169.254.169.254/latest").is_err());
    }

    #[test]
    fn test_non_http_endpoints_are_rejected() {
        assert!(endpoint_url("ws://127.0.0.1:8546").is_err());
        assert!(endpoint_url("file:///tmp/bundler.sock").is_err());
        assert!(endpoint_url("api.pimlico.io/v2/1/rpc").is_err());
    }

    #[test]
    fn test_host_hides_path_and_query() {
        let client = JsonRpcClient::new("https://api.pimlico.io/v2/480/rpc?apikey=secret").unwrap();
        assert_eq!(client.host(), "api.pimlico.io");
    }

    #[test]
    fn test_bundler_rejection_keeps_code_and_reason() {
        let err = response_result(
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32500,"message":"AA21 didn't pay prefund","data":{"reason":"AA21"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RpcError::RpcResponseError { code: -32500, ref error_message } if error_message.contains("AA21")
        ));
    }

    #[test]
    fn test_pending_lookup_is_a_null_result() {
        let pending = response_result(br#"{"jsonrpc":"2.0","id":7,"result":null,"error":null}"#).unwrap();
        assert!(pending.is_null());

        let missing = response_result(br#"{"jsonrpc":"2.0","id":7}"#).unwrap_err();
        assert!(matches!(missing, RpcError::InvalidResponse { .. }));

        let garbage = response_result(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(garbage, RpcError::JsonError { .. }));
    }
}
