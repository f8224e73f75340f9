//! `EntryPoint` v0.6 shape, signed through the `0.2.0` Safe 4337 module.

use alloy::{
    primitives::{aliases::U48, keccak256, Address, Bytes, B256, U256},
    sol,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use super::{hex_quantity, EstimateGasData, OperationError, SafeOpSchema, SafeOperationOptions, UserOperationDraft};

/// Reference: <https://github.com/safe-global/safe-modules/blob/4337/v0.2.0/modules/4337/contracts/Safe4337Module.sol#L53>
const SAFE_OP_TYPE: &str = "SafeOp(address safe,uint256 nonce,bytes initCode,bytes callData,uint256 callGasLimit,uint256 verificationGasLimit,uint256 preVerificationGas,uint256 maxFeePerGas,uint256 maxPriorityFeePerGas,bytes paymasterAndData,uint48 validAfter,uint48 validUntil,address entryPoint)";

sol! {
    /// `abi.encode` layout of the v0.2.0 `SafeOp` struct hash input.
    #[sol(rename_all = "camelcase")]
    struct EncodedSafeOpStructV06 {
        bytes32 type_hash;
        address safe;
        uint256 nonce;
        bytes32 init_code_hash;
        bytes32 call_data_hash;
        uint256 call_gas_limit;
        uint256 verification_gas_limit;
        uint256 pre_verification_gas;
        uint256 max_fee_per_gas;
        uint256 max_priority_fee_per_gas;
        bytes32 paymaster_and_data_hash;
        uint48 valid_after;
        uint48 valid_until;
        address entry_point;
    }
}

/// A v0.6 user operation as bundlers exchange it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV06 {
    /// The account.
    pub sender: Address,
    /// Anti-replay nonce.
    pub nonce: U256,
    /// `factory ++ factoryData`, empty for a deployed account.
    pub init_code: Bytes,
    /// Account calldata.
    pub call_data: Bytes,
    /// Execution gas limit.
    pub call_gas_limit: U256,
    /// Validation gas limit.
    pub verification_gas_limit: U256,
    /// Bundler overhead.
    pub pre_verification_gas: U256,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: U256,
    /// EIP-1559 tip.
    pub max_priority_fee_per_gas: U256,
    /// `paymaster ++ paymasterData`, empty without a paymaster.
    pub paymaster_and_data: Bytes,
    /// `validAfter ++ validUntil ++ signatures`.
    pub signature: Bytes,
}

impl UserOperationV06 {
    pub(super) fn from_draft(draft: UserOperationDraft) -> Self {
        let init_code = match draft.factory {
            Some(factory) => [factory.as_slice(), draft.factory_data.as_ref()].concat().into(),
            None => Bytes::new(),
        };
        Self {
            sender: draft.sender,
            nonce: draft.nonce,
            init_code,
            call_data: draft.call_data,
            call_gas_limit: draft.call_gas_limit,
            verification_gas_limit: draft.verification_gas_limit,
            pre_verification_gas: draft.pre_verification_gas,
            max_fee_per_gas: draft.max_fee_per_gas,
            max_priority_fee_per_gas: draft.max_priority_fee_per_gas,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        }
    }
}

impl SafeOpSchema for UserOperationV06 {
    fn safe_op_type(&self) -> &'static str {
        SAFE_OP_TYPE
    }

    fn safe_op_struct_hash(&self, options: &SafeOperationOptions) -> B256 {
        let encoded = EncodedSafeOpStructV06 {
            type_hash: keccak256(SAFE_OP_TYPE),
            safe: self.sender,
            nonce: self.nonce,
            init_code_hash: keccak256(&self.init_code),
            call_data_hash: keccak256(&self.call_data),
            call_gas_limit: self.call_gas_limit,
            verification_gas_limit: self.verification_gas_limit,
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            paymaster_and_data_hash: keccak256(&self.paymaster_and_data),
            valid_after: U48::saturating_from(options.valid_after),
            valid_until: U48::saturating_from(options.valid_until),
            entry_point: options.entry_point,
        };
        keccak256(encoded.abi_encode())
    }

    fn safe_op_message(&self, options: &SafeOperationOptions) -> serde_json::Value {
        serde_json::json!({
            "safe": self.sender,
            "nonce": hex_quantity(self.nonce),
            "initCode": self.init_code,
            "callData": self.call_data,
            "callGasLimit": hex_quantity(self.call_gas_limit),
            "verificationGasLimit": hex_quantity(self.verification_gas_limit),
            "preVerificationGas": hex_quantity(self.pre_verification_gas),
            "maxFeePerGas": hex_quantity(self.max_fee_per_gas),
            "maxPriorityFeePerGas": hex_quantity(self.max_priority_fee_per_gas),
            "paymasterAndData": self.paymaster_and_data,
            "validAfter": hex_quantity(options.valid_after),
            "validUntil": hex_quantity(options.valid_until),
            "entryPoint": options.entry_point,
        })
    }

    fn merge_estimations(&mut self, data: &EstimateGasData) -> Result<(), OperationError> {
        let gas_fields = [
            (&mut self.call_gas_limit, data.call_gas_limit),
            (&mut self.verification_gas_limit, data.verification_gas_limit),
            (&mut self.pre_verification_gas, data.pre_verification_gas),
            (&mut self.max_fee_per_gas, data.max_fee_per_gas),
            (&mut self.max_priority_fee_per_gas, data.max_priority_fee_per_gas),
        ];
        for (slot, value) in gas_fields {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if let Some(packed) = &data.paymaster_and_data {
            self.paymaster_and_data = packed.clone();
        } else if let Some(paymaster) = data.paymaster {
            // ERC-7677 services answer with split fields for both versions
            let paymaster_data = data.paymaster_data.clone().unwrap_or_default();
            self.paymaster_and_data = [paymaster.as_slice(), paymaster_data.as_ref()].concat().into();
        }
        Ok(())
    }

    fn user_operation_hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();
        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }

    fn verification_gas_limit(&self) -> U256 {
        self.verification_gas_limit
    }

    fn set_signature(&mut self, signature: Bytes) {
        self.signature = signature;
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn nonce(&self) -> U256 {
        self.nonce
    }

    fn call_data(&self) -> &Bytes {
        &self.call_data
    }

    fn init_code(&self) -> Bytes {
        self.init_code.clone()
    }
}
