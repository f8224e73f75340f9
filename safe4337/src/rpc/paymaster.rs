//! Paymaster service methods.
//!
//! The fee estimators are the only callers: vendor method names never leak past them.
//!
//! Reference: <https://eips.ethereum.org/EIPS/eip-7677>

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::{JsonRpcClient, RpcError};
use crate::operation::{EstimateGasData, UserOperation};

/// Paymaster context sent along ERC-7677 and sponsorship requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterContext {
    /// Sponsorship policy selecting who pays.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsorship_policy_id: Option<String>,
    /// ERC-20 token gas is paid in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
}

/// EIP-1559 fees of one speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrice {
    /// Fee cap.
    pub max_fee_per_gas: U256,
    /// Tip.
    pub max_priority_fee_per_gas: U256,
}

/// `pimlico_getUserOperationGasPrice` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    /// Cheapest tier.
    pub slow: GasPrice,
    /// Default tier.
    pub standard: GasPrice,
    /// Fastest tier.
    pub fast: GasPrice,
}

/// Exchange rate of a token accepted by an ERC-20 paymaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuote {
    /// Paymaster accepting the token.
    pub paymaster: Address,
    /// The token.
    pub token: Address,
    /// Gas the paymaster spends in `postOp`.
    pub post_op_gas: U256,
    /// Token units per native unit, scaled by 1e18.
    pub exchange_rate: U256,
    /// Native to USD rate, when the vendor provides it.
    #[serde(default)]
    pub exchange_rate_native_to_usd: Option<U256>,
}

#[derive(Debug, Deserialize)]
struct TokenQuotes {
    quotes: Vec<TokenQuote>,
}

#[derive(Debug, Serialize)]
struct TokenQuoteRequest<'a> {
    tokens: &'a [Address],
}

/// Client for a paymaster service.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    rpc: JsonRpcClient,
}

impl PaymasterClient {
    /// Creates a client for the paymaster service at `url`.
    ///
    /// # Errors
    /// Returns `RpcError::InvalidUrl` for rejected URLs.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url)?,
        })
    }

    /// Host of the service, safe to log.
    #[must_use]
    pub fn host(&self) -> &str {
        self.rpc.host()
    }

    /// `pm_getPaymasterStubData`: approximate paymaster fields good enough for gas estimation.
    ///
    /// # Errors
    /// Propagates transport and RPC errors unchanged.
    pub async fn get_paymaster_stub_data(
        &self,
        user_operation: &UserOperation,
        entry_point: Address,
        chain_id: u64,
        context: &PaymasterContext,
    ) -> Result<EstimateGasData, RpcError> {
        self.rpc
            .request(
                "pm_getPaymasterStubData",
                (user_operation, entry_point, chain_id_hex(chain_id), context),
            )
            .await
    }

    /// `pm_getPaymasterData`: final paymaster fields for the estimated operation.
    ///
    /// # Errors
    /// Propagates transport and RPC errors unchanged.
    pub async fn get_paymaster_data(
        &self,
        user_operation: &UserOperation,
        entry_point: Address,
        chain_id: u64,
        context: &PaymasterContext,
    ) -> Result<EstimateGasData, RpcError> {
        self.rpc
            .request(
                "pm_getPaymasterData",
                (user_operation, entry_point, chain_id_hex(chain_id), context),
            )
            .await
    }

    /// `pm_sponsorUserOperation`: sponsorship with sponsorship-validated gas limits.
    ///
    /// # Errors
    /// Propagates transport and RPC errors unchanged.
    pub async fn sponsor_user_operation(
        &self,
        user_operation: &UserOperation,
        entry_point: Address,
        context: &PaymasterContext,
    ) -> Result<EstimateGasData, RpcError> {
        self.rpc
            .request(
                "pm_sponsorUserOperation",
                (user_operation, entry_point, context),
            )
            .await
    }

    /// `pimlico_getUserOperationGasPrice`
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn get_user_operation_gas_price(&self) -> Result<GasPriceTiers, RpcError> {
        self.rpc
            .request("pimlico_getUserOperationGasPrice", Vec::<()>::new())
            .await
    }

    /// `pimlico_getTokenQuotes`
    ///
    /// # Errors
    /// Propagates transport and RPC errors.
    pub async fn get_token_quotes(
        &self,
        tokens: &[Address],
        entry_point: Address,
        chain_id: u64,
    ) -> Result<Vec<TokenQuote>, RpcError> {
        let quotes: TokenQuotes = self
            .rpc
            .request(
                "pimlico_getTokenQuotes",
                (TokenQuoteRequest { tokens }, entry_point, chain_id_hex(chain_id)),
            )
            .await?;
        Ok(quotes.quotes)
    }
}

fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, uint};

    #[test]
    fn test_context_serialization() {
        assert_eq!(
            serde_json::to_value(PaymasterContext {
                sponsorship_policy_id: Some("sp_my_policy".to_string()),
                token: None,
            })
            .unwrap(),
            serde_json::json!({ "sponsorshipPolicyId": "sp_my_policy" })
        );
        assert_eq!(
            serde_json::to_value(PaymasterContext::default()).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn test_stub_response_maps_onto_estimate_gas_data() {
        let data: EstimateGasData = serde_json::from_value(serde_json::json!({
            "paymaster": "0x0000000000000039cd5e8aE05257CE51C473ddd1",
            "paymasterData": "0x0102",
            "paymasterVerificationGasLimit": "0x7415",
            "paymasterPostOpGasLimit": "0x0",
            "sponsor": { "name": "Pimlico" },
            "isFinal": false,
        }))
        .unwrap();
        assert_eq!(
            data.paymaster,
            Some(address!("0x0000000000000039cd5e8aE05257CE51C473ddd1"))
        );
        assert_eq!(data.paymaster_verification_gas_limit, Some(uint!(0x7415_U256)));
        assert!(data.call_gas_limit.is_none());
    }

    #[test]
    fn test_token_quotes_deserialization() {
        let quotes: TokenQuotes = serde_json::from_value(serde_json::json!({
            "quotes": [{
                "paymaster": "0x0000000000000039cd5e8aE05257CE51C473ddd1",
                "token": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
                "postOpGas": "0xc350",
                "exchangeRate": "0x5cc717fbb3450c0000",
                "exchangeRateNativeToUsd": "0x5cc717fbb3450c0000",
                "balanceSlot": "0x9",
                "allowanceSlot": "0xa",
            }],
        }))
        .unwrap();
        assert_eq!(quotes.quotes.len(), 1);
        assert_eq!(quotes.quotes[0].post_op_gas, uint!(50_000_U256));
    }
}
