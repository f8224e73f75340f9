use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::{SolCall, SolValue},
};

use super::{contracts::IMultiSend, EncodingError, MetaTransaction, OperationType};

sol! {
    /// Packed layout of one transaction inside a `multiSend` payload.
    ///
    /// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/libraries/MultiSend.sol#L26>
    #[sol(rename_all = "camelcase")]
    #[derive(Debug, Default)]
    struct MultiSendTx {
        /// call = 0, delegatecall = 1
        uint8 operation;
        address to;
        uint256 value;
        uint256 data_length;
        bytes data;
    }
}

/// `operation (1) ++ to (20) ++ value (32) ++ dataLength (32)`
const PACKED_HEADER_LEN: usize = 1 + 20 + 32 + 32;

impl From<&MetaTransaction> for MultiSendTx {
    fn from(tx: &MetaTransaction) -> Self {
        Self {
            operation: tx.operation as u8,
            to: tx.to,
            value: tx.value,
            data_length: U256::from(tx.data.len()),
            data: tx.data.clone(),
        }
    }
}

/// Packs transactions into the `transactions` argument of `multiSend`.
#[must_use]
pub fn pack_transactions(transactions: &[MetaTransaction]) -> Bytes {
    transactions
        .iter()
        .flat_map(|tx| MultiSendTx::from(tx).abi_encode_packed())
        .collect::<Vec<u8>>()
        .into()
}

/// Encodes a full `multiSend(bytes)` call.
#[must_use]
pub fn encode_multi_send(transactions: &[MetaTransaction]) -> Bytes {
    IMultiSend::multiSendCall {
        transactions: pack_transactions(transactions),
    }
    .abi_encode()
    .into()
}

/// Reverses [`pack_transactions`].
///
/// # Errors
/// Returns `EncodingError::MalformedBatch` if the payload is truncated or carries an unknown
/// operation byte.
pub fn unpack_transactions(mut packed: &[u8]) -> Result<Vec<MetaTransaction>, EncodingError> {
    let mut transactions = Vec::new();
    while !packed.is_empty() {
        if packed.len() < PACKED_HEADER_LEN {
            return Err(EncodingError::MalformedBatch {
                message: format!("truncated header ({} bytes left)", packed.len()),
            });
        }
        let operation = OperationType::try_from(packed[0])?;
        let to = Address::from_slice(&packed[1..21]);
        let value = U256::from_be_slice(&packed[21..53]);
        let data_length = usize::try_from(U256::from_be_slice(&packed[53..85])).map_err(|_| {
            EncodingError::MalformedBatch {
                message: "data length overflows".to_string(),
            }
        })?;
        let rest = &packed[PACKED_HEADER_LEN..];
        if rest.len() < data_length {
            return Err(EncodingError::MalformedBatch {
                message: format!("expected {data_length} data bytes, found {}", rest.len()),
            });
        }
        transactions.push(MetaTransaction {
            to,
            value,
            data: Bytes::copy_from_slice(&rest[..data_length]),
            operation,
        });
        packed = &rest[data_length..];
    }
    Ok(transactions)
}

/// Decodes a full `multiSend(bytes)` call into its transactions.
///
/// # Errors
/// Returns an error if `call_data` is not a `multiSend` call or its payload is malformed.
pub fn decode_multi_send(call_data: &[u8]) -> Result<Vec<MetaTransaction>, EncodingError> {
    let call = IMultiSend::multiSendCall::abi_decode(call_data).map_err(|e| {
        EncodingError::MalformedBatch {
            message: e.to_string(),
        }
    })?;
    unpack_transactions(&call.transactions)
}
