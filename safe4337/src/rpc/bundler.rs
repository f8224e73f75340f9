use alloy::primitives::{Address, B256, U256, U64};
use serde::{Deserialize, Serialize};

use super::{JsonRpcClient, RpcError};
use crate::operation::{EstimateGasData, UserOperation};

/// Receipt of an included user operation (`eth_getUserOperationReceipt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// The `EntryPoint` hash of the operation.
    pub user_op_hash: B256,
    /// `EntryPoint` that executed it.
    #[serde(default)]
    pub entry_point: Option<Address>,
    /// The account.
    pub sender: Address,
    /// Raw nonce.
    pub nonce: U256,
    /// Paymaster that paid, if any.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// Wei charged.
    pub actual_gas_cost: U256,
    /// Gas used.
    pub actual_gas_used: U256,
    /// Whether the execution phase succeeded.
    pub success: bool,
    /// Revert reason on failure.
    #[serde(default)]
    pub reason: Option<String>,
    /// The bundle transaction.
    pub receipt: BundleTransactionReceipt,
}

/// The fields of the bundle transaction receipt this crate reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransactionReceipt {
    /// Hash of the bundle transaction.
    pub transaction_hash: B256,
    /// Block it was included in.
    #[serde(default)]
    pub block_number: Option<U256>,
    /// Hash of that block.
    #[serde(default)]
    pub block_hash: Option<B256>,
}

/// A user operation looked up by hash (`eth_getUserOperationByHash`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationByHash {
    /// The operation as submitted.
    pub user_operation: UserOperation,
    /// `EntryPoint` it was submitted to.
    pub entry_point: Address,
    /// Bundle transaction, once included.
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    /// Block, once included.
    #[serde(default)]
    pub block_hash: Option<B256>,
    /// Block number, once included.
    #[serde(default)]
    pub block_number: Option<U256>,
}

/// Client for an ERC-4337 bundler.
///
/// Integers cross the wire as hex strings; conversion happens in the serde impls of the
/// `alloy` primitives.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    rpc: JsonRpcClient,
}

impl BundlerClient {
    /// Creates a client for the bundler at `url`.
    ///
    /// # Errors
    /// Returns `RpcError::InvalidUrl` for rejected URLs.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url)?,
        })
    }

    /// Host of the bundler, safe to log.
    #[must_use]
    pub fn host(&self) -> &str {
        self.rpc.host()
    }

    /// `eth_chainId`
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let chain_id: U64 = self.rpc.request("eth_chainId", Vec::<()>::new()).await?;
        Ok(chain_id.to::<u64>())
    }

    /// `eth_supportedEntryPoints`
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn supported_entry_points(&self) -> Result<Vec<Address>, RpcError> {
        self.rpc.request("eth_supportedEntryPoints", Vec::<()>::new()).await
    }

    /// `eth_estimateUserOperationGas`. The operation must carry a signature of realistic
    /// shape (a dummy one is fine) so validation gas is measured correctly.
    ///
    /// # Errors
    /// Propagates transport and RPC errors unchanged.
    pub async fn estimate_user_operation_gas(
        &self,
        user_operation: &UserOperation,
        entry_point: Address,
    ) -> Result<EstimateGasData, RpcError> {
        self.rpc
            .request(
                "eth_estimateUserOperationGas",
                (user_operation, entry_point),
            )
            .await
    }

    /// `eth_sendUserOperation`. Returns the `EntryPoint` hash the bundler assigned.
    ///
    /// # Errors
    /// Propagates transport and RPC errors unchanged.
    pub async fn send_user_operation(
        &self,
        user_operation: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, RpcError> {
        self.rpc
            .request("eth_sendUserOperation", (user_operation, entry_point))
            .await
    }

    /// `eth_getUserOperationByHash`. `None` if the bundler does not know the operation.
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn get_user_operation_by_hash(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationByHash>, RpcError> {
        self.rpc
            .request("eth_getUserOperationByHash", [user_op_hash])
            .await
    }

    /// `eth_getUserOperationReceipt`. `None` while the operation is pending.
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, RpcError> {
        self.rpc
            .request("eth_getUserOperationReceipt", [user_op_hash])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, uint};

    #[test]
    fn test_receipt_deserialization() {
        let receipt: UserOperationReceipt = serde_json::from_value(serde_json::json!({
            "userOpHash": "0xf56239eeacb960d469a19f397dd6dce1b0ca6c9553aeff6fc72100cbddbfdb1a",
            "entryPoint": "0x0000000071727De22E5E9d8BAf0edAc6f37da032",
            "sender": "0xf1390a26bd60d83a4e38c7be7be1003c616296ad",
            "nonce": "0x3",
            "paymaster": null,
            "actualGasCost": "0x1b7c4f0a8",
            "actualGasUsed": "0x1c0b5",
            "success": true,
            "logs": [],
            "receipt": {
                "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "blockNumber": "0x10",
                "logs": [],
            },
        }))
        .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.nonce, uint!(3_U256));
        assert_eq!(receipt.receipt.block_number, Some(uint!(16_U256)));
        assert_eq!(
            receipt.receipt.transaction_hash,
            b256!("0x1111111111111111111111111111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn test_estimation_result_maps_onto_estimate_gas_data() {
        let data: EstimateGasData = serde_json::from_value(serde_json::json!({
            "preVerificationGas": "0xb7d0",
            "verificationGasLimit": "0x186a0",
            "callGasLimit": "0x9c40",
            "paymasterVerificationGasLimit": "0x0",
        }))
        .unwrap();
        assert_eq!(data.verification_gas_limit, Some(uint!(100_000_U256)));
        assert_eq!(data.paymaster_verification_gas_limit, Some(U256::ZERO));
        assert_eq!(data.max_fee_per_gas, None);
    }
}
