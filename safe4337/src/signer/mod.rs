//! Owner signatures over Safe operations.
//!
//! Two kinds of owners sign:
//! - keys signing EIP-712 typed data ([`TypedDataSigner`]), through an ordered list of
//!   historically compatible request shapes;
//! - passkeys ([`PasskeySigner`]), signing the raw operation hash and attributed to the shared
//!   WebAuthn signer contract.
//!
//! Each call produces exactly one [`SafeSignature`]. Collecting the threshold is the caller's job.

use std::{fmt, sync::Arc};

use alloy::primitives::{Address, Bytes};

use crate::operation::{OperationError, SafeOperation, SafeSignature};

/// Passkey owners.
pub mod passkey;

mod typed_data;

pub use passkey::{PasskeySigner, WebAuthnAssertion};
pub use typed_data::{sign_with_strategies, LocalKeySigner, TypedDataSigner};

/// Typed-data request shapes, named after the wallet RPC methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum SigningMethod {
    /// `eth_signTypedData_v4`
    #[default]
    EthSignTypedDataV4,
    /// `eth_signTypedData_v3`
    EthSignTypedDataV3,
    /// `eth_signTypedData`
    EthSignTypedData,
}

impl SigningMethod {
    const ALL: [Self; 3] = [
        Self::EthSignTypedDataV4,
        Self::EthSignTypedDataV3,
        Self::EthSignTypedData,
    ];

    /// `preferred` first, then the remaining shapes from newest to oldest.
    #[must_use]
    pub fn strategies(preferred: Self) -> Vec<Self> {
        std::iter::once(preferred)
            .chain(Self::ALL.into_iter().filter(|method| *method != preferred))
            .collect()
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EthSignTypedDataV4 => write!(f, "eth_signTypedData_v4"),
            Self::EthSignTypedDataV3 => write!(f, "eth_signTypedData_v3"),
            Self::EthSignTypedData => write!(f, "eth_signTypedData"),
        }
    }
}

/// The active owner.
#[derive(Debug, Clone)]
pub enum OwnerSigner {
    /// A key signing typed data.
    TypedData(Arc<dyn TypedDataSigner>),
    /// A passkey registered with the shared WebAuthn signer.
    Passkey(Arc<dyn PasskeySigner>),
}

impl OwnerSigner {
    /// The owner address the Safe knows this signer by.
    #[must_use]
    pub fn owner_address(&self, shared_signer: Address) -> Address {
        match self {
            Self::TypedData(signer) => signer.address(),
            Self::Passkey(_) => shared_signer,
        }
    }

    /// Whether this is a passkey.
    #[must_use]
    pub const fn is_passkey(&self) -> bool {
        matches!(self, Self::Passkey(_))
    }

    /// Signs `operation` once.
    ///
    /// # Errors
    /// - `SignerError::SigningUnsupported` if no typed-data strategy is available on the key.
    /// - `SignerError::Signing` / `SignerError::InvalidAssertion` on signer failures.
    pub async fn sign(
        &self,
        operation: &SafeOperation,
        method: SigningMethod,
        shared_signer: Address,
    ) -> Result<SafeSignature, SignerError> {
        match self {
            Self::TypedData(signer) => {
                let typed_data = operation.typed_data()?;
                let signature = sign_with_strategies(
                    signer.as_ref(),
                    &typed_data,
                    &SigningMethod::strategies(method),
                )
                .await?;
                Ok(SafeSignature::eoa(signer.address(), &signature))
            }
            Self::Passkey(passkey) => {
                crate::debug!("signer.passkey raw_id={}", passkey.raw_id());
                passkey::sign_hash(passkey.as_ref(), operation.hash(), shared_signer).await
            }
        }
    }

    /// A stand-in signature of realistic size, for gas estimation.
    #[must_use]
    pub fn dummy_signature(&self, shared_signer: Address) -> SafeSignature {
        match self {
            Self::TypedData(signer) => {
                let mut data = vec![0xff; 64];
                data.push(0x1f);
                SafeSignature::from_raw(signer.address(), Bytes::from(data))
            }
            Self::Passkey(_) => passkey::dummy_signature(shared_signer),
        }
    }
}

/// Errors raised while producing a signature.
#[crate::safe4337_error]
pub enum SignerError {
    /// The key does not implement this request shape.
    #[error("{method} is not supported by this signer")]
    Unsupported {
        /// The rejected shape.
        method: SigningMethod,
    },
    /// No request shape is supported by the key.
    #[error("signer {signer} does not support any typed data signing method")]
    SigningUnsupported {
        /// The key.
        signer: String,
    },
    /// The key or authenticator failed.
    #[error("signing failed: {message}")]
    Signing {
        /// Details.
        message: String,
    },
    /// Not a valid private key.
    #[error("invalid private key: {message}")]
    InvalidKey {
        /// Details.
        message: String,
    },
    /// The WebAuthn assertion cannot be turned into a contract signature.
    #[error("invalid WebAuthn assertion: {message}")]
    InvalidAssertion {
        /// Details.
        message: String,
    },
    /// The typed-data payload could not be built.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        operation::{SafeOperationOptions, UserOperationDraft},
        primitives::config::ENTRY_POINT_V07,
    };
    use alloy::{
        primitives::{address, bytes, U256},
        signers::local::PrivateKeySigner,
    };

    const SHARED_SIGNER: Address = address!("0x94a4F6affBd8975951142c3999aEAB7ecee555c2");

    #[test]
    fn test_strategy_order() {
        assert_eq!(
            SigningMethod::strategies(SigningMethod::EthSignTypedDataV3),
            vec![
                SigningMethod::EthSignTypedDataV3,
                SigningMethod::EthSignTypedDataV4,
                SigningMethod::EthSignTypedData,
            ]
        );
        assert_eq!(SigningMethod::strategies(SigningMethod::default()).len(), 3);
    }

    #[tokio::test]
    async fn test_key_signature_recovers_to_owner_over_operation_hash() {
        let key = PrivateKeySigner::random();
        let owner = key.address();
        let signer = OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(key)));
        let operation = SafeOperation::new(
            UserOperationDraft::new(
                address!("0xf1390a26bd60d83a4e38c7be7be1003c616296ad"),
                U256::ZERO,
                bytes!("7bb37428"),
            ),
            SafeOperationOptions {
                chain_id: 480,
                module_address: address!("0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226"),
                entry_point: ENTRY_POINT_V07,
                valid_after: 0,
                valid_until: 0,
            },
        )
        .unwrap();

        let signature = signer
            .sign(&operation, SigningMethod::default(), SHARED_SIGNER)
            .await
            .unwrap();
        assert_eq!(signature.signer, owner);
        assert!(!signature.is_contract_signature);

        let parsed = alloy::signers::Signature::try_from(signature.data.as_ref()).unwrap();
        assert_eq!(
            parsed.recover_address_from_prehash(&operation.hash()).unwrap(),
            owner
        );
    }

    #[test]
    fn test_dummy_key_signature_is_one_static_slot() {
        let signer = OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(
            PrivateKeySigner::random(),
        )));
        let dummy = signer.dummy_signature(SHARED_SIGNER);
        assert_eq!(dummy.data.len(), 65);
        assert!(!dummy.is_contract_signature);
        assert_eq!(signer.owner_address(SHARED_SIGNER), dummy.signer);
    }
}
