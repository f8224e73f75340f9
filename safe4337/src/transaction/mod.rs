//! Turns the calls a Safe should perform into the single `callData` of a user operation.
//!
//! One call becomes `executeUserOp(to, value, data, operation)`. Several calls are packed
//! into a `multiSend` payload which the account delegate-calls through `executeUserOp`, so the
//! bundler always sees exactly one top-level call.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};

use crate::primitives::{ParseFromForeignBinding, PrimitiveError};

/// Solidity interfaces.
pub mod contracts;

/// `MultiSend` payload packing.
pub mod multisend;

use contracts::ISafe4337Module;

/// How the Safe executes a call.
///
/// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/libraries/Enum.sol>
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Enum)]
#[repr(u8)]
pub enum OperationType {
    /// Regular `CALL`.
    #[default]
    Call = 0,
    /// `DELEGATECALL`, running the target's code in the Safe's context.
    DelegateCall = 1,
}

impl TryFrom<u8> for OperationType {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Call),
            1 => Ok(Self::DelegateCall),
            value => Err(EncodingError::InvalidOperation { value }),
        }
    }
}

/// A call the Safe should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    /// Target contract or recipient.
    pub to: Address,
    /// Wei sent along.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
    /// Call type.
    pub operation: OperationType,
}

impl MetaTransaction {
    /// A plain call.
    #[must_use]
    pub const fn call(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            operation: OperationType::Call,
        }
    }

    /// A delegate call.
    #[must_use]
    pub const fn delegate_call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data,
            operation: OperationType::DelegateCall,
        }
    }
}

/// A call as received from a foreign caller or a JSON payload, every field a string.
#[derive(Debug, Clone, uniffi::Record)]
pub struct UnparsedMetaTransaction {
    /// Target address.
    pub to: String,
    /// Value in wei, hex (`0x`) or decimal. Empty means zero.
    pub value: String,
    /// Hex calldata. Empty means no data.
    pub data: String,
    /// Call type, defaults to [`OperationType::Call`].
    pub operation: Option<OperationType>,
}

impl TryFrom<UnparsedMetaTransaction> for MetaTransaction {
    type Error = EncodingError;

    fn try_from(tx: UnparsedMetaTransaction) -> Result<Self, Self::Error> {
        let to = Address::parse_from_ffi(&tx.to, "to")?;
        let value = if tx.value.trim().is_empty() {
            U256::ZERO
        } else {
            U256::parse_from_ffi(&tx.value, "value")?
        };
        let data = parse_hex_data(&tx.data)?;

        Ok(Self {
            to,
            value,
            data,
            operation: tx.operation.unwrap_or_default(),
        })
    }
}

fn parse_hex_data(raw: &str) -> Result<Bytes, EncodingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Bytes::new());
    }
    Bytes::from_str(trimmed).map_err(|_| EncodingError::InvalidHex {
        value: trimmed.to_string(),
    })
}

/// Encodes the calls into the account's `executeUserOp` calldata.
///
/// `multi_send` and `multi_send_call_only` are the batching contracts used for more than one
/// call. The call-only variant is preferred unless a nested delegate call is requested.
///
/// # Errors
/// Returns `EncodingError::EmptyBatch` when `transactions` is empty.
pub fn encode_calls(
    transactions: &[MetaTransaction],
    multi_send: Address,
    multi_send_call_only: Address,
) -> Result<Bytes, EncodingError> {
    match transactions {
        [] => Err(EncodingError::EmptyBatch),
        [single] => Ok(encode_execute(single)),
        batch => {
            let needs_delegate = batch
                .iter()
                .any(|tx| tx.operation == OperationType::DelegateCall);
            let target = if needs_delegate {
                multi_send
            } else {
                multi_send_call_only
            };
            Ok(encode_execute(&MetaTransaction::delegate_call(
                target,
                multisend::encode_multi_send(batch),
            )))
        }
    }
}

fn encode_execute(tx: &MetaTransaction) -> Bytes {
    ISafe4337Module::executeUserOpCall {
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        operation: tx.operation as u8,
    }
    .abi_encode()
    .into()
}

/// Reverses [`encode_calls`], unwrapping a `multiSend` batch into its calls.
///
/// Trailing bytes after the ABI payload (such as an analytics identifier) are ignored.
///
/// # Errors
/// Returns `EncodingError::MalformedBatch` if `call_data` is not an `executeUserOp` call.
pub fn decode_calls(call_data: &[u8]) -> Result<Vec<MetaTransaction>, EncodingError> {
    let call = ISafe4337Module::executeUserOpCall::abi_decode(call_data).map_err(|e| {
        EncodingError::MalformedBatch {
            message: e.to_string(),
        }
    })?;
    let operation = OperationType::try_from(call.operation)?;

    if operation == OperationType::DelegateCall
        && call
            .data
            .starts_with(&contracts::IMultiSend::multiSendCall::SELECTOR)
    {
        return multisend::decode_multi_send(&call.data);
    }

    Ok(vec![MetaTransaction {
        to: call.to,
        value: call.value,
        data: call.data,
        operation,
    }])
}

/// Errors raised while encoding calls.
#[crate::safe4337_error]
pub enum EncodingError {
    /// Calldata is not hex.
    #[error("invalid hex data: {value}")]
    InvalidHex {
        /// The rejected input.
        value: String,
    },
    /// A field could not be parsed.
    #[error(transparent)]
    InvalidInput(#[from] PrimitiveError),
    /// Operation byte other than call/delegatecall.
    #[error("invalid operation type {value}")]
    InvalidOperation {
        /// The rejected byte.
        value: u8,
    },
    /// Nothing to encode.
    #[error("at least one transaction is required")]
    EmptyBatch,
    /// A batch payload could not be decoded.
    #[error("malformed batch: {message}")]
    MalformedBatch {
        /// Decoder error.
        message: String,
    },
}
