// supervisord adapter
// Maps the `supervisor.*` XML-RPC interface onto the SupervisorRpc port

use async_trait::async_trait;

use multivisor_core::domain::{ProcessInfo, SupervisorConfig};
use multivisor_core::port::{RpcError, SupervisorRpc};

use crate::client::XmlRpcClient;
use crate::codec::Value;

const NAMESPACE: &str = "supervisor";

pub struct SupervisordClient {
    client: XmlRpcClient,
}

impl SupervisordClient {
    pub fn new(client: XmlRpcClient) -> Self {
        Self { client }
    }

    pub fn for_supervisor(config: &SupervisorConfig) -> Result<Self, RpcError> {
        Ok(Self::new(XmlRpcClient::for_supervisor(config)?))
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        self.client.namespace(NAMESPACE).call(method, params).await
    }

    async fn call_string(&self, method: &str) -> Result<String, RpcError> {
        let value = self.call(method, &[]).await?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(other.unexpected("string", method)),
        }
    }
}

/// Convert one `getProcessInfo` struct; group, name and state are required
fn process_info(value: &Value) -> Result<ProcessInfo, RpcError> {
    let members = value
        .as_struct()
        .ok_or_else(|| value.unexpected("struct", "process info"))?;

    let required_str = |key: &str| -> Result<String, RpcError> {
        members
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::Protocol(format!("process info without '{}'", key)))
    };
    let int = |key: &str| members.get(key).and_then(Value::as_i64).unwrap_or_default();
    let string = |key: &str| {
        members
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let state = members
        .get("state")
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::Protocol("process info without 'state'".to_string()))?;

    Ok(ProcessInfo {
        group: required_str("group")?,
        name: required_str("name")?,
        state,
        statename: string("statename"),
        description: string("description"),
        now: int("now"),
        pid: int("pid"),
        start: int("start"),
        stop: int("stop"),
        exitstatus: int("exitstatus"),
        spawnerr: string("spawnerr"),
        logfile: string("logfile"),
        stdout_logfile: string("stdout_logfile"),
        stderr_logfile: string("stderr_logfile"),
    })
}

#[async_trait]
impl SupervisorRpc for SupervisordClient {
    async fn get_pid(&self) -> Result<i64, RpcError> {
        let value = self.call("getPID", &[]).await?;
        value
            .as_i64()
            .ok_or_else(|| value.unexpected("int", "getPID"))
    }

    async fn get_identification(&self) -> Result<String, RpcError> {
        self.call_string("getIdentification").await
    }

    async fn get_api_version(&self) -> Result<String, RpcError> {
        self.call_string("getAPIVersion").await
    }

    async fn get_version(&self) -> Result<String, RpcError> {
        self.call_string("getVersion").await
    }

    async fn get_supervisor_version(&self) -> Result<String, RpcError> {
        self.call_string("getSupervisorVersion").await
    }

    async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>, RpcError> {
        let value = self.call("getAllProcessInfo", &[]).await?;
        value
            .as_array()
            .ok_or_else(|| value.unexpected("array", "getAllProcessInfo"))?
            .iter()
            .map(process_info)
            .collect()
    }

    async fn get_process_info(&self, full_name: &str) -> Result<ProcessInfo, RpcError> {
        let value = self
            .call("getProcessInfo", &[Value::from(full_name)])
            .await?;
        process_info(&value)
    }

    async fn start_process(&self, full_name: &str) -> Result<(), RpcError> {
        self.call("startProcess", &[Value::from(full_name), Value::from(true)])
            .await
            .map(|_| ())
    }

    async fn stop_process(&self, full_name: &str) -> Result<(), RpcError> {
        self.call("stopProcess", &[Value::from(full_name), Value::from(true)])
            .await
            .map(|_| ())
    }
}
