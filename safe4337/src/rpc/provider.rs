//! Read access to account and chain state.
//!
//! [`SafeProvider`] is the seam between the pipeline and the node: the pack only ever asks
//! these questions, so tests substitute an in-memory implementation.

use alloy::{
    primitives::{Address, Bytes, B256, U256, U64},
    sol_types::SolCall,
};
use async_trait::async_trait;
use ruint::aliases::U192;
use serde::Serialize;

use super::{JsonRpcClient, RpcError};
use crate::transaction::contracts::{IEntryPoint, ISafe, ISafeProxyFactory, FALLBACK_HANDLER_STORAGE_SLOT};

/// Account and chain state the pipeline reads.
#[async_trait]
pub trait SafeProvider: Send + Sync + std::fmt::Debug {
    /// `eth_chainId` of the node.
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Whether code is deployed at `address`.
    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError>;

    /// `Safe.getOwners()`
    async fn owners(&self, safe: Address) -> Result<Vec<Address>, ProviderError>;

    /// `Safe.getThreshold()`
    async fn threshold(&self, safe: Address) -> Result<u64, ProviderError>;

    /// `Safe.VERSION()`
    async fn version(&self, safe: Address) -> Result<String, ProviderError>;

    /// `Safe.isModuleEnabled(module)`
    async fn is_module_enabled(&self, safe: Address, module: Address) -> Result<bool, ProviderError>;

    /// The fallback handler, read from its storage slot.
    async fn fallback_handler(&self, safe: Address) -> Result<Address, ProviderError>;

    /// `EntryPoint.getNonce(sender, key)`
    async fn get_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError>;

    /// `SafeProxyFactory.proxyCreationCode()`
    async fn proxy_creation_code(&self, factory: Address) -> Result<Bytes, ProviderError>;

    /// `eth_gasPrice`
    async fn gas_price(&self) -> Result<U256, ProviderError>;

    /// `eth_maxPriorityFeePerGas`
    async fn max_priority_fee_per_gas(&self) -> Result<U256, ProviderError>;
}

#[derive(Debug, Serialize)]
struct CallRequest {
    to: Address,
    data: Bytes,
}

/// [`SafeProvider`] over a node's JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcSafeProvider {
    rpc: JsonRpcClient,
}

impl RpcSafeProvider {
    /// Creates a provider for the node at `url`.
    ///
    /// # Errors
    /// Returns `RpcError::InvalidUrl` for rejected URLs.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url)?,
        })
    }

    async fn call<C: SolCall + Send + Sync>(&self, to: Address, call: C) -> Result<C::Return, ProviderError> {
        let request = CallRequest {
            to,
            data: call.abi_encode().into(),
        };
        let output: Bytes = self.rpc.request("eth_call", (request, "latest")).await?;
        C::abi_decode_returns(&output).map_err(|e| ProviderError::Decoding {
            message: format!("{}: {e}", C::SIGNATURE),
        })
    }
}

#[async_trait]
impl SafeProvider for RpcSafeProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let chain_id: U64 = self.rpc.request("eth_chainId", Vec::<()>::new()).await?;
        Ok(chain_id.to::<u64>())
    }

    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError> {
        let code: Bytes = self.rpc.request("eth_getCode", (address, "latest")).await?;
        Ok(!code.is_empty())
    }

    async fn owners(&self, safe: Address) -> Result<Vec<Address>, ProviderError> {
        self.call(safe, ISafe::getOwnersCall {}).await
    }

    async fn threshold(&self, safe: Address) -> Result<u64, ProviderError> {
        let threshold = self.call(safe, ISafe::getThresholdCall {}).await?;
        u64::try_from(threshold).map_err(|_| ProviderError::Decoding {
            message: format!("threshold {threshold} out of range"),
        })
    }

    async fn version(&self, safe: Address) -> Result<String, ProviderError> {
        self.call(safe, ISafe::VERSIONCall {}).await
    }

    async fn is_module_enabled(&self, safe: Address, module: Address) -> Result<bool, ProviderError> {
        self.call(safe, ISafe::isModuleEnabledCall { module }).await
    }

    async fn fallback_handler(&self, safe: Address) -> Result<Address, ProviderError> {
        let slot: B256 = self
            .rpc
            .request("eth_getStorageAt", (safe, FALLBACK_HANDLER_STORAGE_SLOT, "latest"))
            .await?;
        Ok(Address::from_word(slot))
    }

    async fn get_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError> {
        self.call(entry_point, IEntryPoint::getNonceCall { sender, key })
            .await
    }

    async fn proxy_creation_code(&self, factory: Address) -> Result<Bytes, ProviderError> {
        self.call(factory, ISafeProxyFactory::proxyCreationCodeCall {})
            .await
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        Ok(self.rpc.request("eth_gasPrice", Vec::<()>::new()).await?)
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, ProviderError> {
        Ok(self
            .rpc
            .request("eth_maxPriorityFeePerGas", Vec::<()>::new())
            .await?)
    }
}

/// Errors raised while reading account or chain state.
#[crate::safe4337_error]
pub enum ProviderError {
    /// Transport or node failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The node answered with data that does not decode.
    #[error("unexpected node response: {message}")]
    Decoding {
        /// Decoder error.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_call_request_shape() {
        let request = CallRequest {
            to: address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032"),
            data: ISafe::getThresholdCall {}.abi_encode().into(),
        };
        let json = serde_json::to_value((request, "latest")).unwrap();
        assert_eq!(json[0]["data"], "0xe75235b8");
        assert_eq!(json[1], "latest");
    }

    #[test]
    fn test_fallback_handler_from_storage_word() {
        let word = B256::left_padding_from(
            address!("0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226").as_slice(),
        );
        assert_eq!(
            Address::from_word(word),
            address!("0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226")
        );
    }
}
