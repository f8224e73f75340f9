use alloy::{
    dyn_abi::TypedData,
    primitives::Address,
    signers::{local::PrivateKeySigner, Signature, SignerSync},
};
use async_trait::async_trait;

use super::{SignerError, SigningMethod};

/// A key that signs EIP-712 typed data, e.g. a wallet connection or a local key.
///
/// Wallets historically exposed several incompatible request shapes. Implementations return
/// [`SignerError::Unsupported`] for shapes they do not implement, which moves the caller on to
/// the next strategy.
#[async_trait]
pub trait TypedDataSigner: Send + Sync + std::fmt::Debug {
    /// Address of the key.
    fn address(&self) -> Address;

    /// Signs `typed_data` through the request shape `method`.
    ///
    /// # Errors
    /// - `SignerError::Unsupported` if `method` is not available on this key.
    /// - `SignerError::Signing` if the key failed to sign.
    async fn sign_typed_data(
        &self,
        typed_data: &TypedData,
        method: SigningMethod,
    ) -> Result<Signature, SignerError>;
}

/// Signs with each strategy in order until one is supported.
///
/// # Errors
/// - `SignerError::SigningUnsupported` if every strategy reported itself unsupported.
/// - Any other error of the first strategy that did not report itself unsupported.
pub async fn sign_with_strategies(
    signer: &dyn TypedDataSigner,
    typed_data: &TypedData,
    strategies: &[SigningMethod],
) -> Result<Signature, SignerError> {
    for &method in strategies {
        match signer.sign_typed_data(typed_data, method).await {
            Err(SignerError::Unsupported { .. }) => {
                crate::debug!("signer.strategy_unsupported method={method}");
            }
            result => return result,
        }
    }
    Err(SignerError::SigningUnsupported {
        signer: signer.address().to_string(),
    })
}

/// An in-process private key.
///
/// Typed data without arrays hashes the same under v3 and v4, so both shapes are served by the
/// same EIP-712 signing hash. The legacy shape is not supported.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    signer: PrivateKeySigner,
}

impl LocalKeySigner {
    /// Wraps an existing key.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Parses a hex-encoded private key, with or without `0x`.
    ///
    /// # Errors
    /// Returns `SignerError::InvalidKey` if the key is not a valid secp256k1 scalar.
    pub fn from_hex(private_key: &str) -> Result<Self, SignerError> {
        let signer = private_key
            .trim_start_matches("0x")
            .parse::<PrivateKeySigner>()
            .map_err(|e| SignerError::InvalidKey {
                message: e.to_string(),
            })?;
        Ok(Self { signer })
    }
}

#[async_trait]
impl TypedDataSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(
        &self,
        typed_data: &TypedData,
        method: SigningMethod,
    ) -> Result<Signature, SignerError> {
        match method {
            SigningMethod::EthSignTypedDataV4 | SigningMethod::EthSignTypedDataV3 => {
                let hash = typed_data
                    .eip712_signing_hash()
                    .map_err(|e| SignerError::Signing {
                        message: e.to_string(),
                    })?;
                self.signer
                    .sign_hash_sync(&hash)
                    .map_err(|e| SignerError::Signing {
                        message: e.to_string(),
                    })
            }
            SigningMethod::EthSignTypedData => Err(SignerError::Unsupported { method }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the shapes it was asked for and supports only `supported`.
    #[derive(Debug)]
    struct ScriptedSigner {
        supported: Option<SigningMethod>,
        inner: LocalKeySigner,
        calls: Mutex<Vec<SigningMethod>>,
    }

    impl ScriptedSigner {
        fn new(supported: Option<SigningMethod>) -> Self {
            Self {
                supported,
                inner: LocalKeySigner::new(PrivateKeySigner::random()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TypedDataSigner for ScriptedSigner {
        fn address(&self) -> Address {
            self.inner.address()
        }

        async fn sign_typed_data(
            &self,
            typed_data: &TypedData,
            method: SigningMethod,
        ) -> Result<Signature, SignerError> {
            self.calls.lock().unwrap().push(method);
            if self.supported == Some(method) {
                self.inner
                    .sign_typed_data(typed_data, SigningMethod::EthSignTypedDataV4)
                    .await
            } else {
                Err(SignerError::Unsupported { method })
            }
        }
    }

    fn typed_data() -> TypedData {
        serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "Ping": [{ "name": "value", "type": "uint256" }],
            },
            "primaryType": "Ping",
            "domain": {
                "chainId": "0x1",
                "verifyingContract": "0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226",
            },
            "message": { "value": "0x2a" },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_strategies_are_tried_in_order() {
        let signer = ScriptedSigner::new(Some(SigningMethod::EthSignTypedData));
        let strategies = SigningMethod::strategies(SigningMethod::EthSignTypedDataV4);

        let signature = sign_with_strategies(&signer, &typed_data(), &strategies)
            .await
            .unwrap();

        assert_eq!(
            *signer.calls.lock().unwrap(),
            vec![
                SigningMethod::EthSignTypedDataV4,
                SigningMethod::EthSignTypedDataV3,
                SigningMethod::EthSignTypedData,
            ]
        );
        let hash = typed_data().eip712_signing_hash().unwrap();
        assert_eq!(
            signature.recover_address_from_prehash(&hash).unwrap(),
            signer.address()
        );
    }

    #[tokio::test]
    async fn test_first_supported_strategy_wins() {
        let signer = ScriptedSigner::new(Some(SigningMethod::EthSignTypedDataV3));
        let strategies = SigningMethod::strategies(SigningMethod::EthSignTypedDataV3);

        sign_with_strategies(&signer, &typed_data(), &strategies)
            .await
            .unwrap();
        assert_eq!(*signer.calls.lock().unwrap(), vec![SigningMethod::EthSignTypedDataV3]);
    }

    #[tokio::test]
    async fn test_no_supported_strategy() {
        let signer = ScriptedSigner::new(None);
        let strategies = SigningMethod::strategies(SigningMethod::EthSignTypedDataV4);

        let err = sign_with_strategies(&signer, &typed_data(), &strategies)
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::SigningUnsupported { .. }));
        assert_eq!(signer.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_local_key_rejects_legacy_shape() {
        let signer = LocalKeySigner::from_hex(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            signer.address(),
            alloy::primitives::address!("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23")
        );
        let err = signer
            .sign_typed_data(&typed_data(), SigningMethod::EthSignTypedData)
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Unsupported { .. }));
    }
}
