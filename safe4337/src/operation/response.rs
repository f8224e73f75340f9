//! Operations arriving from outside the pipeline: records of the Safe operation indexing service
//! and string-typed operations lifted from foreign callers.

use alloy::primitives::{Address, Bytes, U256};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::{
    OperationError, SafeOperation, SafeOperationOptions, SafeSignature, UserOperation,
    UserOperationV06, UserOperationV07,
};
use crate::primitives::{config::EntryPointVersion, ParseFromForeignBinding, PrimitiveError};

/// Marks a confirmation verified through EIP-1271 rather than `ecrecover`.
const CONTRACT_SIGNATURE_TYPE: &str = "CONTRACT_SIGNATURE";

/// An owner confirmation stored by the indexing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeOperationConfirmation {
    /// ISO-8601 creation time.
    pub created: String,
    /// ISO-8601 modification time.
    #[serde(default)]
    pub modified: Option<String>,
    /// The confirming owner.
    pub owner: Address,
    /// Raw signature data.
    pub signature: Bytes,
    /// `EOA`, `ETH_SIGN`, `APPROVED_HASH` or `CONTRACT_SIGNATURE`.
    pub signature_type: String,
}

/// The user operation embedded in a [`SafeOperationResponse`].
///
/// Quantities are decimal strings, as the service renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRecord {
    /// Transaction that included the operation, once executed.
    #[serde(default)]
    pub ethereum_tx_hash: Option<String>,
    /// The Safe.
    pub sender: Address,
    /// The `EntryPoint` hash of the operation.
    pub user_operation_hash: String,
    /// Raw nonce.
    pub nonce: String,
    /// `factory ++ factoryData`.
    #[serde(default)]
    pub init_code: Option<Bytes>,
    /// Account calldata.
    pub call_data: Bytes,
    /// Execution gas limit.
    pub call_gas_limit: String,
    /// Validation gas limit.
    pub verification_gas_limit: String,
    /// Bundler overhead.
    pub pre_verification_gas: String,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: String,
    /// EIP-1559 tip.
    pub max_priority_fee_per_gas: String,
    /// Paymaster, if any.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// Everything after the paymaster address in `paymasterAndData`.
    #[serde(default)]
    pub paymaster_data: Option<Bytes>,
    /// Packed signature as submitted.
    #[serde(default)]
    pub signature: Option<Bytes>,
    /// Target `EntryPoint`.
    pub entry_point: Address,
}

/// A (possibly partially signed) Safe operation as stored by the indexing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeOperationResponse {
    /// ISO-8601 creation time.
    pub created: String,
    /// ISO-8601 modification time.
    #[serde(default)]
    pub modified: Option<String>,
    /// The EIP-712 `SafeOp` hash.
    pub safe_operation_hash: String,
    /// Raw nonce.
    pub nonce: String,
    /// `factory ++ factoryData`.
    #[serde(default)]
    pub init_code: Option<Bytes>,
    /// Account calldata.
    pub call_data: Bytes,
    /// Execution gas limit.
    pub call_gas_limit: String,
    /// Validation gas limit.
    pub verification_gas_limit: String,
    /// Bundler overhead.
    pub pre_verification_gas: String,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: String,
    /// EIP-1559 tip.
    pub max_priority_fee_per_gas: String,
    /// Paymaster, if any.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// Everything after the paymaster address in `paymasterAndData`.
    #[serde(default)]
    pub paymaster_data: Option<Bytes>,
    /// Target `EntryPoint`.
    pub entry_point: Address,
    /// ISO-8601 lower validity bound.
    #[serde(default)]
    pub valid_after: Option<String>,
    /// ISO-8601 upper validity bound.
    #[serde(default)]
    pub valid_until: Option<String>,
    /// The `Safe4337Module` the operation is signed for.
    pub module_address: Address,
    /// Collected owner confirmations.
    #[serde(default)]
    pub confirmations: Vec<SafeOperationConfirmation>,
    /// Encoded signatures once the threshold is met.
    #[serde(default)]
    pub prepared_signature: Option<Bytes>,
    /// The embedded user operation.
    #[serde(default)]
    pub user_operation: Option<UserOperationRecord>,
}

impl SafeOperation {
    /// Normalizes an indexing-service record into a [`SafeOperation`] on `chain_id`, re-adding
    /// every confirmation as a signature.
    ///
    /// # Errors
    /// - `OperationError::InvalidRecord` if the record misses the sender, or carries an
    ///   unparsable quantity or timestamp.
    /// - Any error of [`SafeOperation::from_user_operation`].
    pub fn from_response(
        response: &SafeOperationResponse,
        chain_id: u64,
    ) -> Result<Self, OperationError> {
        let sender = response
            .user_operation
            .as_ref()
            .map(|op| op.sender)
            .ok_or_else(|| OperationError::InvalidRecord {
                message: "record carries no user operation sender".to_string(),
            })?;

        let quantity = |raw: &str, attribute: &'static str| {
            U256::parse_from_ffi(raw, attribute).map_err(|e| OperationError::InvalidRecord {
                message: e.to_string(),
            })
        };
        let nonce = quantity(&response.nonce, "nonce")?;
        let call_gas_limit = quantity(&response.call_gas_limit, "call_gas_limit")?;
        let verification_gas_limit =
            quantity(&response.verification_gas_limit, "verification_gas_limit")?;
        let pre_verification_gas = quantity(&response.pre_verification_gas, "pre_verification_gas")?;
        let max_fee_per_gas = quantity(&response.max_fee_per_gas, "max_fee_per_gas")?;
        let max_priority_fee_per_gas =
            quantity(&response.max_priority_fee_per_gas, "max_priority_fee_per_gas")?;

        let init_code = response.init_code.clone().unwrap_or_default();
        let paymaster_and_data = response.paymaster.map_or_else(Bytes::new, |paymaster| {
            let data = response.paymaster_data.clone().unwrap_or_default();
            [paymaster.as_slice(), data.as_ref()].concat().into()
        });

        let user_operation = match EntryPointVersion::from_address(response.entry_point)? {
            EntryPointVersion::V06 => UserOperation::V06(UserOperationV06 {
                sender,
                nonce,
                init_code,
                call_data: response.call_data.clone(),
                call_gas_limit,
                verification_gas_limit,
                pre_verification_gas,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                paymaster_and_data,
                signature: Bytes::new(),
            }),
            EntryPointVersion::V07 => {
                let (factory, factory_data) = split_init_code(&init_code);
                let mut op = UserOperationV07 {
                    sender,
                    nonce,
                    factory,
                    factory_data,
                    call_data: response.call_data.clone(),
                    call_gas_limit,
                    verification_gas_limit,
                    pre_verification_gas,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    paymaster: None,
                    paymaster_verification_gas_limit: None,
                    paymaster_post_op_gas_limit: None,
                    paymaster_data: None,
                    signature: Bytes::new(),
                };
                super::SafeOpSchema::merge_estimations(
                    &mut op,
                    &super::EstimateGasData {
                        paymaster_and_data: Some(paymaster_and_data),
                        ..super::EstimateGasData::default()
                    },
                )?;
                UserOperation::V07(op)
            }
        };

        let options = SafeOperationOptions {
            chain_id,
            module_address: response.module_address,
            entry_point: response.entry_point,
            valid_after: parse_timestamp(response.valid_after.as_deref())?,
            valid_until: parse_timestamp(response.valid_until.as_deref())?,
        };

        let mut operation = Self::from_user_operation(user_operation, options)?;
        for confirmation in &response.confirmations {
            let signature = if confirmation.signature_type == CONTRACT_SIGNATURE_TYPE {
                SafeSignature::contract(confirmation.owner, confirmation.signature.clone())
            } else {
                SafeSignature::from_raw(confirmation.owner, confirmation.signature.clone())
            };
            operation.add_signature(signature);
        }
        Ok(operation)
    }
}

fn split_init_code(init_code: &Bytes) -> (Option<Address>, Option<Bytes>) {
    if init_code.len() < 20 {
        return (None, None);
    }
    (
        Some(Address::from_slice(&init_code[..20])),
        Some(Bytes::copy_from_slice(&init_code[20..])),
    )
}

/// ISO-8601 to unix seconds. Absent means unbounded (0).
fn parse_timestamp(raw: Option<&str>) -> Result<u64, OperationError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| OperationError::InvalidRecord {
        message: format!("invalid timestamp {raw}: {e}"),
    })?;
    u64::try_from(parsed.timestamp()).map_err(|_| OperationError::InvalidRecord {
        message: format!("timestamp {raw} predates the unix epoch"),
    })
}

/// A user operation lifted from a foreign caller, every field a string.
///
/// v0.6 operations fill `init_code` and `paymaster_and_data`, v0.7 operations the split
/// factory and paymaster fields.
#[derive(uniffi::Record, Clone, Debug, Default)]
pub struct UnparsedUserOperation {
    /// The account (Solidity type: `address`)
    pub sender: String,
    /// Anti-replay nonce (Solidity type: `uint256`)
    pub nonce: String,
    /// v0.6 deployment code (Solidity type: `bytes`)
    pub init_code: Option<String>,
    /// v0.7 factory (Solidity type: `address`)
    pub factory: Option<String>,
    /// v0.7 factory data (Solidity type: `bytes`)
    pub factory_data: Option<String>,
    /// Account calldata (Solidity type: `bytes`)
    pub call_data: String,
    /// Execution gas limit
    pub call_gas_limit: String,
    /// Validation gas limit
    pub verification_gas_limit: String,
    /// Bundler overhead (Solidity type: `uint256`)
    pub pre_verification_gas: String,
    /// EIP-1559 fee cap
    pub max_fee_per_gas: String,
    /// EIP-1559 tip
    pub max_priority_fee_per_gas: String,
    /// v0.6 packed paymaster field (Solidity type: `bytes`)
    pub paymaster_and_data: Option<String>,
    /// v0.7 paymaster (Solidity type: `address`)
    pub paymaster: Option<String>,
    /// v0.7 paymaster validation gas limit (Solidity type: `uint128`)
    pub paymaster_verification_gas_limit: Option<String>,
    /// v0.7 paymaster `postOp` gas limit (Solidity type: `uint128`)
    pub paymaster_post_op_gas_limit: Option<String>,
    /// v0.7 paymaster data (Solidity type: `bytes`)
    pub paymaster_data: Option<String>,
    /// Packed signature, ignored when building a [`SafeOperation`] (Solidity type: `bytes`)
    pub signature: String,
}

impl UnparsedUserOperation {
    /// Parses into the wire shape of `version`.
    ///
    /// # Errors
    /// Returns `PrimitiveError::InvalidInput` naming the first field that does not parse.
    pub fn parse(self, version: EntryPointVersion) -> Result<UserOperation, PrimitiveError> {
        let sender = Address::parse_from_ffi(&self.sender, "sender")?;
        let nonce = U256::parse_from_ffi(&self.nonce, "nonce")?;
        let call_data = Bytes::parse_from_ffi(&self.call_data, "call_data")?;
        let call_gas_limit = U256::parse_from_ffi(&self.call_gas_limit, "call_gas_limit")?;
        let verification_gas_limit =
            U256::parse_from_ffi(&self.verification_gas_limit, "verification_gas_limit")?;
        let pre_verification_gas =
            U256::parse_from_ffi(&self.pre_verification_gas, "pre_verification_gas")?;
        let max_fee_per_gas = U256::parse_from_ffi(&self.max_fee_per_gas, "max_fee_per_gas")?;
        let max_priority_fee_per_gas =
            U256::parse_from_ffi(&self.max_priority_fee_per_gas, "max_priority_fee_per_gas")?;
        let signature = Bytes::parse_from_ffi(&self.signature, "signature")?;

        let optional_bytes = |value: Option<String>, attribute| {
            value
                .map(|v| Bytes::parse_from_ffi(&v, attribute))
                .transpose()
        };

        match version {
            EntryPointVersion::V06 => Ok(UserOperation::V06(UserOperationV06 {
                sender,
                nonce,
                init_code: optional_bytes(self.init_code, "init_code")?.unwrap_or_default(),
                call_data,
                call_gas_limit,
                verification_gas_limit,
                pre_verification_gas,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                paymaster_and_data: optional_bytes(self.paymaster_and_data, "paymaster_and_data")?
                    .unwrap_or_default(),
                signature,
            })),
            EntryPointVersion::V07 => Ok(UserOperation::V07(UserOperationV07 {
                sender,
                nonce,
                factory: self
                    .factory
                    .map(|f| Address::parse_from_ffi(&f, "factory"))
                    .transpose()?,
                factory_data: optional_bytes(self.factory_data, "factory_data")?,
                call_data,
                call_gas_limit,
                verification_gas_limit,
                pre_verification_gas,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                paymaster: self
                    .paymaster
                    .map(|p| Address::parse_from_ffi(&p, "paymaster"))
                    .transpose()?,
                paymaster_verification_gas_limit: self
                    .paymaster_verification_gas_limit
                    .map(|v| U256::parse_from_ffi(&v, "paymaster_verification_gas_limit"))
                    .transpose()?,
                paymaster_post_op_gas_limit: self
                    .paymaster_post_op_gas_limit
                    .map(|v| U256::parse_from_ffi(&v, "paymaster_post_op_gas_limit"))
                    .transpose()?,
                paymaster_data: optional_bytes(self.paymaster_data, "paymaster_data")?,
                signature,
            })),
        }
    }
}
