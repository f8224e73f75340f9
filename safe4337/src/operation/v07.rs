//! `EntryPoint` v0.7 shape, signed through the `0.3.0` Safe 4337 module.

use alloy::{
    primitives::{aliases::U48, keccak256, Address, Bytes, B256, U256},
    sol,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use super::{hex_quantity, EstimateGasData, OperationError, SafeOpSchema, SafeOperationOptions, UserOperationDraft};
use crate::primitives::to_u128;

/// Reference: <https://github.com/safe-global/safe-modules/blob/4337/v0.3.0/modules/4337/contracts/Safe4337Module.sol#L53>
const SAFE_OP_TYPE: &str = "SafeOp(address safe,uint256 nonce,bytes initCode,bytes callData,uint128 verificationGasLimit,uint128 callGasLimit,uint256 preVerificationGas,uint128 maxPriorityFeePerGas,uint128 maxFeePerGas,bytes paymasterAndData,uint48 validAfter,uint48 validUntil,address entryPoint)";

sol! {
    /// `abi.encode` layout of the v0.3.0 `SafeOp` struct hash input, dynamic members pre-hashed.
    #[sol(rename_all = "camelcase")]
    struct EncodedSafeOpStruct {
        bytes32 type_hash;
        address safe;
        uint256 nonce;
        bytes32 init_code_hash;
        bytes32 call_data_hash;
        uint128 verification_gas_limit;
        uint128 call_gas_limit;
        uint256 pre_verification_gas;
        uint128 max_priority_fee_per_gas;
        uint128 max_fee_per_gas;
        bytes32 paymaster_and_data_hash;
        uint48 valid_after;
        uint48 valid_until;
        address entry_point;
    }
}

/// A v0.7 user operation as bundlers exchange it.
///
/// Reference: <https://github.com/eth-infinitism/account-abstraction/blob/v0.7.0/erc/ERCS/erc-4337.md>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV07 {
    /// The account.
    pub sender: Address,
    /// Anti-replay nonce (`key << 64 | sequence`).
    pub nonce: U256,
    /// Account factory, only for an undeployed account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Factory calldata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// Account calldata.
    pub call_data: Bytes,
    /// Execution gas limit (`uint128`).
    pub call_gas_limit: U256,
    /// Validation gas limit (`uint128`).
    pub verification_gas_limit: U256,
    /// Bundler overhead.
    pub pre_verification_gas: U256,
    /// EIP-1559 fee cap (`uint128`).
    pub max_fee_per_gas: U256,
    /// EIP-1559 tip (`uint128`).
    pub max_priority_fee_per_gas: U256,
    /// Paymaster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Paymaster validation gas limit (`uint128`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Paymaster `postOp` gas limit (`uint128`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Paymaster data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// `validAfter ++ validUntil ++ signatures`.
    pub signature: Bytes,
}

impl UserOperationV07 {
    pub(super) fn from_draft(draft: UserOperationDraft) -> Result<Self, OperationError> {
        let op = Self {
            sender: draft.sender,
            nonce: draft.nonce,
            factory: draft.factory,
            factory_data: draft.factory.map(|_| draft.factory_data),
            call_data: draft.call_data,
            call_gas_limit: draft.call_gas_limit,
            verification_gas_limit: draft.verification_gas_limit,
            pre_verification_gas: draft.pre_verification_gas,
            max_fee_per_gas: draft.max_fee_per_gas,
            max_priority_fee_per_gas: draft.max_priority_fee_per_gas,
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: Bytes::new(),
        };
        op.validate_ranges()?;
        Ok(op)
    }

    /// Checks every `uint128` field fits.
    pub(super) fn validate_ranges(&self) -> Result<(), OperationError> {
        to_u128(self.call_gas_limit, "call_gas_limit")?;
        to_u128(self.verification_gas_limit, "verification_gas_limit")?;
        to_u128(self.max_fee_per_gas, "max_fee_per_gas")?;
        to_u128(self.max_priority_fee_per_gas, "max_priority_fee_per_gas")?;
        if let Some(limit) = self.paymaster_verification_gas_limit {
            to_u128(limit, "paymaster_verification_gas_limit")?;
        }
        if let Some(limit) = self.paymaster_post_op_gas_limit {
            to_u128(limit, "paymaster_post_op_gas_limit")?;
        }
        Ok(())
    }

    /// `paymaster ++ uint128 verificationGasLimit ++ uint128 postOpGasLimit ++ paymasterData`,
    /// empty without a paymaster.
    #[must_use]
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::new();
        };
        let mut out = Vec::with_capacity(52);
        out.extend_from_slice(paymaster.as_slice());
        out.extend_from_slice(&narrow(self.paymaster_verification_gas_limit.unwrap_or_default()).to_be_bytes());
        out.extend_from_slice(&narrow(self.paymaster_post_op_gas_limit.unwrap_or_default()).to_be_bytes());
        if let Some(data) = &self.paymaster_data {
            out.extend_from_slice(data);
        }
        out.into()
    }

    fn set_packed_paymaster(&mut self, packed: &[u8]) {
        if packed.len() < 52 {
            self.paymaster = None;
            self.paymaster_verification_gas_limit = None;
            self.paymaster_post_op_gas_limit = None;
            self.paymaster_data = None;
            return;
        }
        self.paymaster = Some(Address::from_slice(&packed[..20]));
        self.paymaster_verification_gas_limit = Some(U256::from_be_slice(&packed[20..36]));
        self.paymaster_post_op_gas_limit = Some(U256::from_be_slice(&packed[36..52]));
        self.paymaster_data = Some(Bytes::copy_from_slice(&packed[52..]));
    }

    fn gas_word(high: U256, low: U256) -> B256 {
        B256::from((U256::from(narrow(high)) << 128) | U256::from(narrow(low)))
    }
}

// ranges are checked on every write path
fn narrow(value: U256) -> u128 {
    u128::try_from(value).unwrap_or(u128::MAX)
}

impl SafeOpSchema for UserOperationV07 {
    fn safe_op_type(&self) -> &'static str {
        SAFE_OP_TYPE
    }

    fn safe_op_struct_hash(&self, options: &SafeOperationOptions) -> B256 {
        let encoded = EncodedSafeOpStruct {
            type_hash: keccak256(SAFE_OP_TYPE),
            safe: self.sender,
            nonce: self.nonce,
            init_code_hash: keccak256(self.init_code()),
            call_data_hash: keccak256(&self.call_data),
            verification_gas_limit: narrow(self.verification_gas_limit),
            call_gas_limit: narrow(self.call_gas_limit),
            pre_verification_gas: self.pre_verification_gas,
            max_priority_fee_per_gas: narrow(self.max_priority_fee_per_gas),
            max_fee_per_gas: narrow(self.max_fee_per_gas),
            paymaster_and_data_hash: keccak256(self.paymaster_and_data()),
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
            "initCode": self.init_code(),
            "callData": self.call_data,
            "verificationGasLimit": hex_quantity(self.verification_gas_limit),
            "callGasLimit": hex_quantity(self.call_gas_limit),
            "preVerificationGas": hex_quantity(self.pre_verification_gas),
            "maxPriorityFeePerGas": hex_quantity(self.max_priority_fee_per_gas),
            "maxFeePerGas": hex_quantity(self.max_fee_per_gas),
            "paymasterAndData": self.paymaster_and_data(),
            "validAfter": hex_quantity(options.valid_after),
            "validUntil": hex_quantity(options.valid_until),
            "entryPoint": options.entry_point,
        })
    }

    fn merge_estimations(&mut self, data: &EstimateGasData) -> Result<(), OperationError> {
        let mut next = self.clone();
        let gas_fields = [
            (&mut next.call_gas_limit, data.call_gas_limit),
            (&mut next.verification_gas_limit, data.verification_gas_limit),
            (&mut next.pre_verification_gas, data.pre_verification_gas),
            (&mut next.max_fee_per_gas, data.max_fee_per_gas),
            (&mut next.max_priority_fee_per_gas, data.max_priority_fee_per_gas),
        ];
        for (slot, value) in gas_fields {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if data.paymaster.is_none() {
            if let Some(packed) = &data.paymaster_and_data {
                next.set_packed_paymaster(packed);
            }
        }
        if data.paymaster.is_some() {
            next.paymaster = data.paymaster;
        }
        if data.paymaster_data.is_some() {
            next.paymaster_data.clone_from(&data.paymaster_data);
        }
        if data.paymaster_verification_gas_limit.is_some() {
            next.paymaster_verification_gas_limit = data.paymaster_verification_gas_limit;
        }
        if data.paymaster_post_op_gas_limit.is_some() {
            next.paymaster_post_op_gas_limit = data.paymaster_post_op_gas_limit;
        }

        // all or nothing
        next.validate_ranges()?;
        *self = next;
        Ok(())
    }

    fn user_operation_hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(self.init_code()),
            keccak256(&self.call_data),
            Self::gas_word(self.verification_gas_limit, self.call_gas_limit),
            self.pre_verification_gas,
            Self::gas_word(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            keccak256(self.paymaster_and_data()),
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
        let Some(factory) = self.factory else {
            return Bytes::new();
        };
        let mut out = factory.to_vec();
        if let Some(data) = &self.factory_data {
            out.extend_from_slice(data);
        }
        out.into()
    }
}
