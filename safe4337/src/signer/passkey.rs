//! Passkey owners.
//!
//! A passkey cannot produce ECDSA signatures, so it owns the Safe indirectly: the shared WebAuthn
//! signer contract is the owner, its configuration (public key and verifier) lives in the Safe's
//! storage, and passkey signatures are contract signatures attributed to the shared signer.
//!
//! Reference: <https://github.com/safe-global/safe-modules/tree/main/modules/passkey>

use alloy::primitives::{aliases::U176, Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;

use super::SignerError;
use crate::{operation::SafeSignature, transaction::contracts::WebAuthnSignerConfiguration};

const CHALLENGE_FIELD: &str = "\"challenge\":\"";

/// The parts of a WebAuthn assertion the on-chain verifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnAssertion {
    /// Raw authenticator data.
    pub authenticator_data: Bytes,
    /// The `clientDataJSON` as returned by the authenticator.
    pub client_data_json: String,
    /// P-256 signature `r`.
    pub r: U256,
    /// P-256 signature `s`.
    pub s: U256,
}

/// A WebAuthn credential able to sign challenges.
#[async_trait]
pub trait PasskeySigner: Send + Sync + std::fmt::Debug {
    /// Credential ID.
    fn raw_id(&self) -> Bytes;

    /// `x` coordinate of the P-256 public key.
    fn x(&self) -> U256;

    /// `y` coordinate of the P-256 public key.
    fn y(&self) -> U256;

    /// P-256 verifier descriptor: precompile address and fallback verifier packed in `uint176`.
    fn verifiers(&self) -> U176;

    /// Asks the authenticator to sign `challenge`.
    ///
    /// # Errors
    /// Returns `SignerError::Signing` if the authenticator refuses or fails.
    async fn sign(&self, challenge: B256) -> Result<WebAuthnAssertion, SignerError>;
}

/// The `configure` argument registering `passkey` with the shared signer.
pub fn signer_configuration(passkey: &dyn PasskeySigner) -> WebAuthnSignerConfiguration {
    WebAuthnSignerConfiguration {
        x: passkey.x(),
        y: passkey.y(),
        verifiers: passkey.verifiers(),
    }
}

/// Signs the Safe operation `hash` directly, without a typed-data wrapper.
///
/// # Errors
/// - `SignerError::Signing` if the authenticator fails.
/// - `SignerError::InvalidAssertion` if `clientDataJSON` carries no challenge.
pub async fn sign_hash(
    passkey: &dyn PasskeySigner,
    hash: B256,
    shared_signer: Address,
) -> Result<SafeSignature, SignerError> {
    let assertion = passkey.sign(hash).await?;
    let fields = client_data_fields(&assertion.client_data_json)?;
    Ok(SafeSignature::contract(
        shared_signer,
        encode_signature(&assertion.authenticator_data, fields, assertion.r, assertion.s),
    ))
}

/// A signature with the shape of a real assertion, for gas estimation.
#[must_use]
pub fn dummy_signature(shared_signer: Address) -> SafeSignature {
    let mut authenticator_data = vec![0xfe; 32];
    // user present + user verified
    authenticator_data.push(0x05);
    authenticator_data.extend_from_slice(&[0xfe; 4]);
    let word = U256::from_be_bytes([0xec; 32]);
    SafeSignature::contract(
        shared_signer,
        encode_signature(
            &authenticator_data.into(),
            r#""origin":"https://safe.global","crossOrigin":false"#,
            word,
            word,
        ),
    )
}

/// `abi.encode(bytes authenticatorData, bytes clientDataFields, uint256[2] rs)`
fn encode_signature(authenticator_data: &Bytes, client_data_fields: &str, r: U256, s: U256) -> Bytes {
    (
        authenticator_data.clone(),
        Bytes::copy_from_slice(client_data_fields.as_bytes()),
        [r, s],
    )
        .abi_encode_params()
        .into()
}

/// The fields of `clientDataJSON` following the challenge, without the closing brace.
///
/// The verifier rebuilds `{"type":"webauthn.get","challenge":"<base64url>",<fields>}` on-chain
/// from the signed hash, so only the trailing fields travel with the signature.
fn client_data_fields(client_data_json: &str) -> Result<&str, SignerError> {
    let invalid = |message: &str| SignerError::InvalidAssertion {
        message: message.to_string(),
    };
    let start = client_data_json
        .find(CHALLENGE_FIELD)
        .ok_or_else(|| invalid("clientDataJSON has no challenge"))?
        + CHALLENGE_FIELD.len();
    let challenge_end = client_data_json[start..]
        .find('"')
        .ok_or_else(|| invalid("unterminated challenge"))?
        + start
        + 1;
    let rest = client_data_json[challenge_end..]
        .trim_end()
        .strip_suffix('}')
        .ok_or_else(|| invalid("clientDataJSON is not an object"))?;
    Ok(rest.strip_prefix(',').unwrap_or(rest))
}
