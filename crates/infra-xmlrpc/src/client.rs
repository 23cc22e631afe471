//! Serialized XML-RPC client
//!
//! One client owns one HTTP connection to one endpoint. `call` holds an async
//! mutex for the whole request/response round trip, so concurrent callers
//! queue up instead of interleaving on the wire. No request timeout is set:
//! a hung remote blocks its own callers only.

use reqwest::header::CONTENT_TYPE;
use tokio::sync::Mutex;
use tracing::trace;

use multivisor_core::domain::SupervisorConfig;
use multivisor_core::port::RpcError;

use crate::codec::{decode_response, encode_call, Value};

pub struct XmlRpcClient {
    http: reqwest::Client,
    url: String,
    credentials: Option<(String, String)>,
    lock: Mutex<()>,
}

impl XmlRpcClient {
    /// # Errors
    /// RpcError::Transport if the HTTP client cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| RpcError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
            credentials: None,
            lock: Mutex::new(()),
        })
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Client for `http://host:port/RPC2` with the supervisor's credentials
    pub fn for_supervisor(config: &SupervisorConfig) -> Result<Self, RpcError> {
        let client = Self::new(format!("http://{}:{}/RPC2", config.host, config.port))?;
        Ok(match config.credentials() {
            Some((username, password)) => client.with_credentials(username, password),
            None => client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one call; at most one call per client is in flight
    ///
    /// # Errors
    /// - RpcError::Transport for connection failures and non-2xx statuses
    /// - RpcError::Fault for XML-RPC faults
    /// - RpcError::Protocol for undecodable responses
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let body = encode_call(method, params);
        let _guard = self.lock.lock().await;
        trace!(url = %self.url, method, "xmlrpc call");

        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!("{} returned HTTP {}", method, status)));
        }
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        decode_response(&text)
    }

    /// Method-name prefixing view, e.g. `namespace("supervisor")`
    pub fn namespace<'a>(&'a self, name: &str) -> Namespace<'a> {
        Namespace {
            client: self,
            prefix: name.to_string(),
        }
    }
}

/// `prefix.method` view over a client; namespaces nest
pub struct Namespace<'a> {
    client: &'a XmlRpcClient,
    prefix: String,
}

impl<'a> Namespace<'a> {
    pub fn namespace(&self, name: &str) -> Namespace<'a> {
        Namespace {
            client: self.client,
            prefix: format!("{}.{}", self.prefix, name),
        }
    }

    pub fn method_name(&self, method: &str) -> String {
        format!("{}.{}", self.prefix, method)
    }

    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        self.client.call(&self.method_name(method), params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_url_and_credentials() {
        let config = SupervisorConfig::new("lid001")
            .with_host("10.0.0.7")
            .with_port(9011)
            .with_credentials("admin", "secret");
        let client = XmlRpcClient::for_supervisor(&config).unwrap();
        assert_eq!(client.url(), "http://10.0.0.7:9011/RPC2");
        assert_eq!(
            client.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );

        let anonymous = XmlRpcClient::for_supervisor(&SupervisorConfig::new("lid002")).unwrap();
        assert_eq!(anonymous.url(), "http://lid002:9001/RPC2");
        assert!(anonymous.credentials.is_none());
    }

    #[test]
    fn test_nested_namespaces() {
        let client = XmlRpcClient::new("http://localhost:9001/RPC2").unwrap();
        let supervisor = client.namespace("supervisor");
        assert_eq!(supervisor.method_name("getPID"), "supervisor.getPID");
        assert_eq!(
            supervisor.namespace("twiddler").method_name("getGroupNames"),
            "supervisor.twiddler.getGroupNames"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let client = XmlRpcClient::new("http://127.0.0.1:9/RPC2").unwrap();
        let result = client.call("supervisor.getPID", &[]).await;
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }
}
