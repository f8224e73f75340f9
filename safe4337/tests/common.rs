#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpListener,
    sync::{Arc, Mutex},
};

use alloy::primitives::{bytes, Address, Bytes, U256};
use async_trait::async_trait;
use ruint::aliases::U192;
use serde_json::{json, Value};

use safe4337::{
    primitives::config::{Safe4337Contracts, ENTRY_POINT_V06, ENTRY_POINT_V07},
    rpc::{ProviderError, SafeProvider},
};

pub const CHAIN_ID: u64 = 11_155_111;

/// A bundler operation hash the mock answers `eth_sendUserOperation` with.
pub const SUBMITTED_HASH: &str =
    "0x7a2b0ad12b1f9a4dfe0fe6b2ba6d13d9b8d0b7f2c5a1ff5b2b8b0a3e9e0c1d2f";

type Handler = dyn Fn(&str, &Value) -> Result<Value, (i64, String)> + Send + Sync;

/// A loopback JSON-RPC endpoint dispatching on the method name and recording every request.
pub struct MockRpcServer {
    pub url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockRpcServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, (i64, String)> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let handler = handler.clone();
                let recorded = recorded.clone();
                std::thread::spawn(move || serve(stream, handler.as_ref(), &recorded));
            }
        });

        Self { url, requests }
    }

    /// Params of every call to `method`, oldest first.
    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.params_of(method).len()
    }
}

fn serve(
    mut stream: std::net::TcpStream,
    handler: &Handler,
    recorded: &Mutex<Vec<(String, Value)>>,
) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }

    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();
    recorded.lock().unwrap().push((method.clone(), params.clone()));

    let response = match handler(&method, &params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message },
        }),
    };
    let body = response.to_string();
    let http = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(http.as_bytes());
}

/// Gas figures the mock bundler reports.
pub const BUNDLER_CALL_GAS: u64 = 50_000;
pub const BUNDLER_VERIFICATION_GAS: u64 = 100_000;
pub const BUNDLER_PRE_VERIFICATION_GAS: u64 = 45_000;

/// A v0.7 bundler that also speaks ERC-7677 and the Pimlico token quote method.
pub fn bundler_and_paymaster(paymaster: Address) -> MockRpcServer {
    MockRpcServer::start(move |method, _params| match method {
        "eth_chainId" => Ok(json!(format!("0x{CHAIN_ID:x}"))),
        "eth_supportedEntryPoints" => Ok(json!([ENTRY_POINT_V07])),
        "eth_estimateUserOperationGas" => Ok(json!({
            "callGasLimit": format!("0x{BUNDLER_CALL_GAS:x}"),
            "verificationGasLimit": format!("0x{BUNDLER_VERIFICATION_GAS:x}"),
            "preVerificationGas": format!("0x{BUNDLER_PRE_VERIFICATION_GAS:x}"),
        })),
        "eth_sendUserOperation" => Ok(json!(SUBMITTED_HASH)),
        "eth_getUserOperationReceipt" | "eth_getUserOperationByHash" => Ok(Value::Null),
        "pm_getPaymasterStubData" => Ok(json!({
            "paymaster": paymaster,
            "paymasterData": "0x00",
            "paymasterVerificationGasLimit": "0x186a0",
            "paymasterPostOpGasLimit": "0xc350",
        })),
        "pm_getPaymasterData" => Ok(json!({
            "paymaster": paymaster,
            "paymasterData": "0xdeadbeef",
        })),
        "pimlico_getTokenQuotes" => Ok(json!({
            "quotes": [{
                "paymaster": paymaster,
                "token": "0x79A02482A880bCE3F13e09Da970dC34db4CD24d1",
                "postOpGas": "0xc350",
                "exchangeRate": "0x5cc6b6a7ed2b0000",
            }],
        })),
        other => Err((-32601, format!("method {other} not found"))),
    })
}

/// A bundler that only serves `EntryPoint` v0.6.
pub fn legacy_bundler() -> MockRpcServer {
    MockRpcServer::start(|method, _params| match method {
        "eth_supportedEntryPoints" => Ok(json!([ENTRY_POINT_V06])),
        other => Err((-32601, format!("method {other} not found"))),
    })
}

/// In-memory account and chain state.
#[derive(Debug)]
pub struct MockSafeProvider {
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub version: String,
    pub module_enabled: bool,
    pub fallback_handler: Address,
    pub deployed: Mutex<bool>,
    pub nonce: U256,
    pub nonce_requests: Mutex<Vec<U192>>,
}

impl MockSafeProvider {
    /// A deployed 1.4.1 Safe with the 0.3.0 module set up.
    pub fn deployed(owners: Vec<Address>, threshold: u64) -> Self {
        Self {
            owners,
            threshold,
            version: "1.4.1".to_string(),
            module_enabled: true,
            fallback_handler: Safe4337Contracts::canonical_v0_3_0().safe_4337_module,
            deployed: Mutex::new(true),
            nonce: U256::from(3),
            nonce_requests: Mutex::new(Vec::new()),
        }
    }

    /// No code anywhere.
    pub fn empty() -> Self {
        Self {
            deployed: Mutex::new(false),
            nonce: U256::ZERO,
            ..Self::deployed(vec![], 1)
        }
    }

    pub fn set_deployed(&self, deployed: bool) {
        *self.deployed.lock().unwrap() = deployed;
    }
}

#[async_trait]
impl SafeProvider for MockSafeProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(CHAIN_ID)
    }

    async fn is_deployed(&self, _address: Address) -> Result<bool, ProviderError> {
        Ok(*self.deployed.lock().unwrap())
    }

    async fn owners(&self, _safe: Address) -> Result<Vec<Address>, ProviderError> {
        Ok(self.owners.clone())
    }

    async fn threshold(&self, _safe: Address) -> Result<u64, ProviderError> {
        Ok(self.threshold)
    }

    async fn version(&self, _safe: Address) -> Result<String, ProviderError> {
        Ok(self.version.clone())
    }

    async fn is_module_enabled(&self, _safe: Address, _module: Address) -> Result<bool, ProviderError> {
        Ok(self.module_enabled)
    }

    async fn fallback_handler(&self, _safe: Address) -> Result<Address, ProviderError> {
        Ok(self.fallback_handler)
    }

    async fn get_nonce(
        &self,
        _entry_point: Address,
        _sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError> {
        self.nonce_requests.lock().unwrap().push(key);
        Ok((U256::from(key) << 64) | self.nonce)
    }

    async fn proxy_creation_code(&self, _factory: Address) -> Result<Bytes, ProviderError> {
        // SafeProxy 1.4.1 creation code prefix, enough for address derivation
        Ok(bytes!("608060405234801561001057600080fd5b506040516101e63803806101e6"))
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        Ok(U256::from(2_000_000_000u64))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, ProviderError> {
        Ok(U256::from(1_000_000_000u64))
    }
}
