//! The Safe operation: a user operation bound to the Safe 4337 module that signs it.
//!
//! A [`SafeOperation`] wraps one of the two `EntryPoint` wire shapes ([`UserOperation::V06`] or
//! [`UserOperation::V07`]) together with the context needed to hash it (chain, module,
//! `EntryPoint`, validity window) and the owner signatures collected so far. The variant is
//! picked once, from the `EntryPoint` address, and every operation afterwards (hashing,
//! merging estimations, serializing) goes through the [`SafeOpSchema`] of that variant.
//!
//! Reference: <https://github.com/safe-global/safe-modules/blob/main/modules/4337/contracts/Safe4337Module.sol>

use alloy::{
    dyn_abi::TypedData,
    primitives::{keccak256, Address, Bytes, B256, U256},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use crate::primitives::{
    config::{ConfigError, EntryPointVersion},
    PrimitiveError,
};

/// `{key, sequence}` nonce lanes.
pub mod nonce;

/// Owner signatures and their Safe encoding.
pub mod signature;

/// Records exchanged with the Safe operation indexing service.
pub mod response;

mod v06;
mod v07;

pub use signature::{SafeSignature, SignatureSet};
pub use v06::UserOperationV06;
pub use v07::UserOperationV07;

/// `keccak256("EIP712Domain(uint256 chainId,address verifyingContract)")`
///
/// Reference: <https://github.com/safe-global/safe-modules/blob/main/modules/4337/contracts/Safe4337Module.sol#L41>
const DOMAIN_SEPARATOR_TYPEHASH: B256 =
    alloy::primitives::b256!("0x47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218");

/// Largest value of a `uint48` validity timestamp.
const MAX_UINT48: u64 = (1 << 48) - 1;

/// Context fixed at construction that binds the signing hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeOperationOptions {
    /// Chain the operation is executed on.
    pub chain_id: u64,
    /// The `Safe4337Module`, which is the EIP-712 verifying contract.
    pub module_address: Address,
    /// `EntryPoint` the operation is submitted to; selects the wire shape.
    pub entry_point: Address,
    /// Earliest timestamp (seconds) the operation is valid at. 0 means no lower bound.
    pub valid_after: u64,
    /// Latest timestamp (seconds) the operation is valid at. 0 means no upper bound.
    pub valid_until: u64,
}

impl SafeOperationOptions {
    fn validate(&self) -> Result<(), OperationError> {
        if self.valid_after > MAX_UINT48 || self.valid_until > MAX_UINT48 {
            return Err(OperationError::InvalidValidityWindow {
                message: "timestamps must fit in uint48".to_string(),
            });
        }
        if self.valid_until != 0 && self.valid_after > self.valid_until {
            return Err(OperationError::InvalidValidityWindow {
                message: format!(
                    "valid_after {} is later than valid_until {}",
                    self.valid_after, self.valid_until
                ),
            });
        }
        Ok(())
    }
}

/// Version-agnostic fields of a user operation before it is shaped for an `EntryPoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperationDraft {
    /// The Safe.
    pub sender: Address,
    /// Raw two-dimensional nonce.
    pub nonce: U256,
    /// Proxy factory, only for an account that is not deployed yet.
    pub factory: Option<Address>,
    /// `createProxyWithNonce` calldata for `factory`.
    pub factory_data: Bytes,
    /// `executeUserOp` calldata.
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
}

impl UserOperationDraft {
    /// Placeholder used for every gas field until estimation overwrites it.
    pub const PLACEHOLDER_GAS: U256 = U256::from_limbs([1, 0, 0, 0]);

    /// A draft with placeholder gas values and no deployment data.
    #[must_use]
    pub const fn new(sender: Address, nonce: U256, call_data: Bytes) -> Self {
        Self {
            sender,
            nonce,
            factory: None,
            factory_data: Bytes::new(),
            call_data,
            call_gas_limit: Self::PLACEHOLDER_GAS,
            verification_gas_limit: Self::PLACEHOLDER_GAS,
            pre_verification_gas: Self::PLACEHOLDER_GAS,
            max_fee_per_gas: Self::PLACEHOLDER_GAS,
            max_priority_fee_per_gas: Self::PLACEHOLDER_GAS,
        }
    }

    /// Attaches the counterfactual deployment.
    #[must_use]
    pub fn with_factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(factory);
        self.factory_data = factory_data;
        self
    }
}

/// Partial gas and paymaster fields produced by one estimation stage.
///
/// Absent fields leave the operation untouched. Deserializes directly from bundler
/// (`eth_estimateUserOperationGas`) and paymaster (ERC-7677) responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateGasData {
    /// Execution gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<U256>,
    /// Validation gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_gas_limit: Option<U256>,
    /// Bundler overhead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_verification_gas: Option<U256>,
    /// EIP-1559 fee cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 tip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    /// v0.6 packed paymaster field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_and_data: Option<Bytes>,
    /// v0.7 paymaster address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// v0.7 paymaster data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// v0.7 paymaster validation gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// v0.7 paymaster `postOp` gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl EstimateGasData {
    /// Whether the stage produced nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layers `other` on top: fields present in `other` win.
    #[must_use]
    pub fn overlay(self, other: Self) -> Self {
        Self {
            call_gas_limit: other.call_gas_limit.or(self.call_gas_limit),
            verification_gas_limit: other.verification_gas_limit.or(self.verification_gas_limit),
            pre_verification_gas: other.pre_verification_gas.or(self.pre_verification_gas),
            max_fee_per_gas: other.max_fee_per_gas.or(self.max_fee_per_gas),
            max_priority_fee_per_gas: other
                .max_priority_fee_per_gas
                .or(self.max_priority_fee_per_gas),
            paymaster_and_data: other.paymaster_and_data.or(self.paymaster_and_data),
            paymaster: other.paymaster.or(self.paymaster),
            paymaster_data: other.paymaster_data.or(self.paymaster_data),
            paymaster_verification_gas_limit: other
                .paymaster_verification_gas_limit
                .or(self.paymaster_verification_gas_limit),
            paymaster_post_op_gas_limit: other
                .paymaster_post_op_gas_limit
                .or(self.paymaster_post_op_gas_limit),
        }
    }
}

/// A user operation in one of the two `EntryPoint` wire shapes.
///
/// Serializes to the exact JSON object bundlers expect (hex-string quantities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserOperation {
    /// `EntryPoint` v0.6. Tried first when deserializing: it requires `initCode` and
    /// `paymasterAndData`, which v0.7 objects never carry.
    V06(UserOperationV06),
    /// `EntryPoint` v0.7.
    V07(UserOperationV07),
}

impl UserOperation {
    /// The wire version.
    #[must_use]
    pub const fn entry_point_version(&self) -> EntryPointVersion {
        match self {
            Self::V06(_) => EntryPointVersion::V06,
            Self::V07(_) => EntryPointVersion::V07,
        }
    }

    fn schema(&self) -> &dyn SafeOpSchema {
        match self {
            Self::V06(op) => op as &dyn SafeOpSchema,
            Self::V07(op) => op as &dyn SafeOpSchema,
        }
    }

    fn schema_mut(&mut self) -> &mut dyn SafeOpSchema {
        match self {
            Self::V06(op) => op as &mut dyn SafeOpSchema,
            Self::V07(op) => op as &mut dyn SafeOpSchema,
        }
    }
}

/// The per-`EntryPoint` behaviour of a Safe operation.
///
/// Both wire shapes implement the same fixed set of operations, so nothing outside this
/// module branches on the version once a [`SafeOperation`] is built.
pub trait SafeOpSchema: std::fmt::Debug {
    /// The `SafeOp` EIP-712 type of the module release targeting this `EntryPoint`.
    fn safe_op_type(&self) -> &'static str;

    /// EIP-712 `hashStruct` of the `SafeOp`.
    fn safe_op_struct_hash(&self, options: &SafeOperationOptions) -> B256;

    /// The `SafeOp` message with every scalar hex-encoded, as typed-data signers expect it.
    fn safe_op_message(&self, options: &SafeOperationOptions) -> serde_json::Value;

    /// Overwrites the fields present in `data`.
    ///
    /// # Errors
    /// Returns an error if a value does not fit the wire type.
    fn merge_estimations(&mut self, data: &EstimateGasData) -> Result<(), OperationError>;

    /// The hash the `EntryPoint` assigns to the operation.
    fn user_operation_hash(&self, entry_point: Address, chain_id: u64) -> B256;

    /// Current validation gas limit.
    fn verification_gas_limit(&self) -> U256;

    /// Replaces the `signature` field.
    fn set_signature(&mut self, signature: Bytes);

    /// The account.
    fn sender(&self) -> Address;

    /// Raw nonce.
    fn nonce(&self) -> U256;

    /// `executeUserOp` calldata.
    fn call_data(&self) -> &Bytes;

    /// `factory ++ factoryData` (v0.6 `initCode`).
    fn init_code(&self) -> Bytes;
}

/// A user operation for a Safe, with its signing context and collected owner signatures.
///
/// The lifecycle is linear: build, merge estimations, add signatures, submit. Adding
/// estimations once a signature exists is rejected with
/// [`OperationError::EstimationAfterSigning`], since gas fields are part of the signed hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeOperation {
    user_operation: UserOperation,
    options: SafeOperationOptions,
    signatures: SignatureSet,
}

impl SafeOperation {
    /// Shapes `draft` for the `EntryPoint` in `options`.
    ///
    /// # Errors
    /// - `OperationError::Config` if the `EntryPoint` is unknown.
    /// - `OperationError::InvalidValidityWindow` if the window does not fit `uint48`.
    /// - `OperationError::ValueOutOfRange` if a v0.7 gas value exceeds `uint128`.
    pub fn new(draft: UserOperationDraft, options: SafeOperationOptions) -> Result<Self, OperationError> {
        options.validate()?;
        let user_operation = match EntryPointVersion::from_address(options.entry_point)? {
            EntryPointVersion::V06 => UserOperation::V06(UserOperationV06::from_draft(draft)),
            EntryPointVersion::V07 => UserOperation::V07(UserOperationV07::from_draft(draft)?),
        };
        Ok(Self {
            user_operation,
            options,
            signatures: SignatureSet::default(),
        })
    }

    /// Wraps a bundler-shaped operation. Its `signature` field is ignored.
    ///
    /// # Errors
    /// - `OperationError::EntryPointMismatch` if the wire shape does not match the `EntryPoint`.
    /// - Any validation error of [`SafeOperation::new`].
    pub fn from_user_operation(
        mut user_operation: UserOperation,
        options: SafeOperationOptions,
    ) -> Result<Self, OperationError> {
        options.validate()?;
        let expected = EntryPointVersion::from_address(options.entry_point)?;
        if user_operation.entry_point_version() != expected {
            return Err(OperationError::EntryPointMismatch {
                entry_point: options.entry_point.to_string(),
                wire_version: user_operation.entry_point_version().to_string(),
            });
        }
        if let UserOperation::V07(op) = &user_operation {
            op.validate_ranges()?;
        }
        user_operation.schema_mut().set_signature(Bytes::new());
        Ok(Self {
            user_operation,
            options,
            signatures: SignatureSet::default(),
        })
    }

    /// The signing context.
    #[must_use]
    pub const fn options(&self) -> &SafeOperationOptions {
        &self.options
    }

    /// The `EntryPoint` wire version.
    #[must_use]
    pub const fn entry_point_version(&self) -> EntryPointVersion {
        self.user_operation.entry_point_version()
    }

    /// The account.
    #[must_use]
    pub fn sender(&self) -> Address {
        self.user_operation.schema().sender()
    }

    /// Raw nonce.
    #[must_use]
    pub fn nonce(&self) -> U256 {
        self.user_operation.schema().nonce()
    }

    /// `executeUserOp` calldata.
    #[must_use]
    pub fn call_data(&self) -> &Bytes {
        self.user_operation.schema().call_data()
    }

    /// Deployment code, empty for deployed accounts.
    #[must_use]
    pub fn init_code(&self) -> Bytes {
        self.user_operation.schema().init_code()
    }

    /// Current validation gas limit.
    #[must_use]
    pub fn verification_gas_limit(&self) -> U256 {
        self.user_operation.schema().verification_gas_limit()
    }

    /// The EIP-712 hash owners sign (`SafeOp` under the module's domain).
    ///
    /// Signatures are not part of it, so adding one never changes the hash.
    #[must_use]
    pub fn hash(&self) -> B256 {
        let struct_hash = self.user_operation.schema().safe_op_struct_hash(&self.options);
        eip_712_hash(self.options.chain_id, self.options.module_address, struct_hash)
    }

    /// The EIP-712 payload handed to typed-data signers.
    ///
    /// Its signing hash equals [`SafeOperation::hash`].
    ///
    /// # Errors
    /// Returns `OperationError::InvalidTypedData` if the payload cannot be assembled.
    pub fn typed_data(&self) -> Result<TypedData, OperationError> {
        let schema = self.user_operation.schema();
        let payload = serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "SafeOp": eip712_fields(schema.safe_op_type()),
            },
            "primaryType": "SafeOp",
            "domain": {
                "chainId": format!("0x{:x}", self.options.chain_id),
                "verifyingContract": self.options.module_address,
            },
            "message": schema.safe_op_message(&self.options),
        });
        serde_json::from_value(payload).map_err(|e| OperationError::InvalidTypedData {
            message: e.to_string(),
        })
    }

    /// Merges one estimation stage into the gas and paymaster fields.
    ///
    /// Only fields present in `data` are overwritten.
    ///
    /// # Errors
    /// - `OperationError::EstimationAfterSigning` if a signature was already added.
    /// - `OperationError::ValueOutOfRange` if a v0.7 gas value exceeds `uint128`.
    pub fn add_estimations(&mut self, data: &EstimateGasData) -> Result<(), OperationError> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.signatures.is_empty() {
            return Err(OperationError::EstimationAfterSigning {
                signatures: self.signatures.len(),
            });
        }
        self.user_operation.schema_mut().merge_estimations(data)
    }

    /// Adds (or replaces) the signature of `signature.signer`.
    pub fn add_signature(&mut self, signature: SafeSignature) {
        self.signatures.add(signature);
    }

    /// The signature of `signer`, if collected.
    #[must_use]
    pub fn get_signature(&self, signer: &Address) -> Option<&SafeSignature> {
        self.signatures.get(signer)
    }

    /// Every collected signature.
    #[must_use]
    pub const fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// Drops every signature, allowing estimations to be merged again.
    pub fn clear_signatures(&mut self) {
        self.signatures.clear();
    }

    /// The collected signatures in Safe's encoding.
    #[must_use]
    pub fn encoded_signatures(&self) -> Bytes {
        self.signatures.encode()
    }

    /// The wire operation with its `signature` set to
    /// `abi.encodePacked(uint48 validAfter, uint48 validUntil, encodedSignatures)`.
    #[must_use]
    pub fn user_operation(&self) -> UserOperation {
        self.user_operation_with_signatures(&self.signatures)
    }

    /// Same as [`SafeOperation::user_operation`] with a stand-in signature set, e.g. dummy
    /// signatures for gas estimation.
    #[must_use]
    pub fn user_operation_with_signatures(&self, signatures: &SignatureSet) -> UserOperation {
        let mut user_operation = self.user_operation.clone();
        user_operation
            .schema_mut()
            .set_signature(self.pack_signature(&signatures.encode()));
        user_operation
    }

    /// The wire operation as it stands, without signatures. This is what estimators and
    /// paymasters quote.
    #[must_use]
    pub const fn unsigned_user_operation(&self) -> &UserOperation {
        &self.user_operation
    }

    /// The hash the `EntryPoint` (and bundler) identify the operation by.
    #[must_use]
    pub fn user_operation_hash(&self) -> B256 {
        self.user_operation
            .schema()
            .user_operation_hash(self.options.entry_point, self.options.chain_id)
    }

    fn pack_signature(&self, encoded: &[u8]) -> Bytes {
        let mut packed = Vec::with_capacity(12 + encoded.len());
        // uint48 each, validated at construction
        packed.extend_from_slice(&self.options.valid_after.to_be_bytes()[2..]);
        packed.extend_from_slice(&self.options.valid_until.to_be_bytes()[2..]);
        packed.extend_from_slice(encoded);
        packed.into()
    }
}

/// `keccak256(0x19 ++ 0x01 ++ domainSeparator ++ structHash)` under the module's domain.
///
/// Reference: <https://eips.ethereum.org/EIPS/eip-712>
fn eip_712_hash(chain_id: u64, verifying_contract: Address, struct_hash: B256) -> B256 {
    let domain_separator = keccak256(
        (DOMAIN_SEPARATOR_TYPEHASH, U256::from(chain_id), verifying_contract).abi_encode(),
    );
    let mut buf = [0u8; 66];
    buf[0] = 0x19;
    buf[1] = 0x01;
    buf[2..34].copy_from_slice(domain_separator.as_slice());
    buf[34..66].copy_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

/// Splits `Name(type a,type b)` into EIP-712 `[{name, type}]` members.
fn eip712_fields(type_string: &str) -> serde_json::Value {
    let members = type_string
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .unwrap_or_default();
    members
        .split(',')
        .filter_map(|member| member.split_once(' '))
        .map(|(ty, name)| serde_json::json!({ "name": name, "type": ty }))
        .collect()
}

fn hex_quantity(value: impl std::fmt::LowerHex) -> String {
    format!("0x{value:x}")
}

/// Errors raised by the operation model.
#[crate::safe4337_error]
pub enum OperationError {
    /// Unknown `EntryPoint` or other configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The wire shape does not match the `EntryPoint`.
    #[error("entry point {entry_point} does not accept {wire_version} user operations")]
    EntryPointMismatch {
        /// The configured `EntryPoint`.
        entry_point: String,
        /// Version of the supplied operation.
        wire_version: String,
    },
    /// Gas fields are part of the signed hash and may not change once signed.
    #[error("cannot merge estimations into an operation that already carries {signatures} signature(s); clear the signatures first")]
    EstimationAfterSigning {
        /// Signatures present.
        signatures: usize,
    },
    /// A value exceeds its wire type.
    #[error(transparent)]
    ValueOutOfRange(#[from] PrimitiveError),
    /// Validity timestamps out of range or inverted.
    #[error("invalid validity window: {message}")]
    InvalidValidityWindow {
        /// Details.
        message: String,
    },
    /// The typed-data payload could not be assembled.
    #[error("invalid typed data: {message}")]
    InvalidTypedData {
        /// Details.
        message: String,
    },
    /// A record from the indexing service could not be normalized.
    #[error("invalid Safe operation record: {message}")]
    InvalidRecord {
        /// Details.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::config::{ENTRY_POINT_V06, ENTRY_POINT_V07};
    use alloy::primitives::{address, bytes, uint};

    pub(super) const MODULE_V07: Address = address!("0x75cf11467937ce3f2f357ce24ffc3dbf8fd5c226");
    pub(super) const MODULE_V06: Address = address!("0xa581c4A4DB7175302464fF3C06380BC3270b4037");

    fn draft() -> UserOperationDraft {
        UserOperationDraft::new(
            address!("0xf1390a26bd60d83a4e38c7be7be1003c616296ad"),
            uint!(3_U256),
            bytes!("7bb37428"),
        )
    }

    fn options(entry_point: Address, module_address: Address) -> SafeOperationOptions {
        SafeOperationOptions {
            chain_id: 11_155_111,
            module_address,
            entry_point,
            valid_after: 0,
            valid_until: 0,
        }
    }

    fn both_versions() -> [SafeOperation; 2] {
        [
            SafeOperation::new(draft(), options(ENTRY_POINT_V06, MODULE_V06)).unwrap(),
            SafeOperation::new(draft(), options(ENTRY_POINT_V07, MODULE_V07)).unwrap(),
        ]
    }

    #[test]
    fn test_variant_follows_entry_point() {
        let [v06, v07] = both_versions();
        assert_eq!(v06.entry_point_version(), EntryPointVersion::V06);
        assert_eq!(v07.entry_point_version(), EntryPointVersion::V07);

        let err = SafeOperation::new(draft(), options(Address::ZERO, MODULE_V07)).unwrap_err();
        assert!(matches!(err, OperationError::Config(ConfigError::UnknownEntryPoint { .. })));
    }

    #[test]
    fn test_typed_data_hash_matches_operation_hash() {
        for mut op in both_versions() {
            op.add_estimations(&EstimateGasData {
                call_gas_limit: Some(uint!(0xabb8_U256)),
                verification_gas_limit: Some(uint!(0xfa07_U256)),
                pre_verification_gas: Some(uint!(0x8e4d78_U256)),
                max_fee_per_gas: Some(uint!(0x1af6f_U256)),
                max_priority_fee_per_gas: Some(uint!(0x1adb0_U256)),
                ..EstimateGasData::default()
            })
            .unwrap();
            let typed_data = op.typed_data().unwrap();
            assert_eq!(typed_data.eip712_signing_hash().unwrap(), op.hash());
        }
    }

    #[test]
    fn test_hash_is_stable_under_wire_round_trip() {
        for op in both_versions() {
            let json = serde_json::to_value(op.user_operation()).unwrap();
            let parsed: UserOperation = serde_json::from_value(json).unwrap();
            let rebuilt = SafeOperation::from_user_operation(parsed, *op.options()).unwrap();
            assert_eq!(rebuilt.hash(), op.hash());
        }
    }

    #[test]
    fn test_adding_signature_keeps_hash() {
        for mut op in both_versions() {
            let before = op.hash();
            op.add_signature(SafeSignature::from_raw(Address::ZERO, Bytes::from(vec![1u8; 65])));
            assert_eq!(op.hash(), before);
        }
    }

    #[test]
    fn test_partial_merge_only_touches_given_field() {
        for mut op in both_versions() {
            let before = serde_json::to_value(op.unsigned_user_operation()).unwrap();
            op.add_estimations(&EstimateGasData {
                call_gas_limit: Some(uint!(50_000_U256)),
                ..EstimateGasData::default()
            })
            .unwrap();
            let after = serde_json::to_value(op.unsigned_user_operation()).unwrap();

            let before = before.as_object().unwrap();
            let after = after.as_object().unwrap();
            assert_eq!(after["callGasLimit"], "0xc350");
            for (key, value) in before {
                if key != "callGasLimit" {
                    assert_eq!(&after[key], value, "{key} changed");
                }
            }
        }
    }

    #[test]
    fn test_estimation_after_signing_is_rejected() {
        let [mut op, _] = both_versions();
        op.add_signature(SafeSignature::from_raw(Address::ZERO, Bytes::from(vec![1u8; 65])));
        let err = op
            .add_estimations(&EstimateGasData {
                call_gas_limit: Some(uint!(1_U256)),
                ..EstimateGasData::default()
            })
            .unwrap_err();
        assert!(matches!(err, OperationError::EstimationAfterSigning { signatures: 1 }));

        op.clear_signatures();
        assert!(op
            .add_estimations(&EstimateGasData {
                call_gas_limit: Some(uint!(1_U256)),
                ..EstimateGasData::default()
            })
            .is_ok());
    }

    #[test]
    fn test_signature_field_packs_validity_window() {
        let mut options = options(ENTRY_POINT_V07, MODULE_V07);
        options.valid_after = 0x12ce_a600;
        options.valid_until = 0x967a_7600;
        let mut op = SafeOperation::new(draft(), options).unwrap();
        let owner = address!("0x1111111111111111111111111111111111111111");
        op.add_signature(SafeSignature::from_raw(owner, Bytes::from(vec![7u8; 65])));

        let UserOperation::V07(wire) = op.user_operation() else {
            panic!("expected v0.7");
        };
        assert_eq!(wire.signature.len(), 12 + 65);
        assert_eq!(&wire.signature[..6], &[0u8, 0, 0x12, 0xce, 0xa6, 0x00]);
        assert_eq!(&wire.signature[6..12], &[0u8, 0, 0x96, 0x7a, 0x76, 0x00]);
        assert_eq!(&wire.signature[12..], &[7u8; 65]);
    }

    #[test]
    fn test_rejects_inverted_validity_window() {
        let mut options = options(ENTRY_POINT_V07, MODULE_V07);
        options.valid_after = 10;
        options.valid_until = 5;
        assert!(matches!(
            SafeOperation::new(draft(), options),
            Err(OperationError::InvalidValidityWindow { .. })
        ));
    }

    #[test]
    fn test_wire_shape_must_match_entry_point() {
        let [v06, _] = both_versions();
        let err = SafeOperation::from_user_operation(
            v06.user_operation(),
            options(ENTRY_POINT_V07, MODULE_V07),
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::EntryPointMismatch { .. }));
    }

    #[test]
    fn test_eip712_fields_parsing() {
        let fields = eip712_fields("SafeOp(address safe,uint48 validAfter)");
        assert_eq!(
            fields,
            serde_json::json!([
                { "name": "safe", "type": "address" },
                { "name": "validAfter", "type": "uint48" },
            ])
        );
    }
}
