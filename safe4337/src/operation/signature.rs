use std::collections::BTreeMap;

use alloy::{
    primitives::{Address, Bytes, U256},
    signers::Signature,
};

/// Length of the static part every signature occupies in Safe's signature bytes.
const STATIC_PART_LEN: usize = 65;

/// One owner's signature over a Safe operation.
///
/// EOA signatures are the 65 byte `r ++ s ++ v`. Contract signatures (EIP-1271, including
/// passkeys through the shared WebAuthn signer) carry arbitrary data appended to the dynamic
/// part of the encoded signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSignature {
    /// The owner this signature is attributed to.
    pub signer: Address,
    /// Raw signature data.
    pub data: Bytes,
    /// Whether `data` must be verified through `isValidSignature` on `signer`.
    pub is_contract_signature: bool,
}

impl SafeSignature {
    /// Wraps an ECDSA signature produced by an owner key.
    #[must_use]
    pub fn eoa(signer: Address, signature: &Signature) -> Self {
        Self {
            signer,
            data: Bytes::copy_from_slice(&signature.as_bytes()),
            is_contract_signature: false,
        }
    }

    /// Wraps a contract signature verified by `signer`.
    #[must_use]
    pub const fn contract(signer: Address, data: Bytes) -> Self {
        Self {
            signer,
            data,
            is_contract_signature: true,
        }
    }

    /// Builds a record from raw bytes. Anything other than a 65 byte ECDSA signature is treated
    /// as contract signature data.
    #[must_use]
    pub fn from_raw(signer: Address, data: Bytes) -> Self {
        let is_contract_signature = data.len() != STATIC_PART_LEN;
        Self {
            signer,
            data,
            is_contract_signature,
        }
    }

    fn static_part(&self, dynamic_offset: usize) -> Vec<u8> {
        if !self.is_contract_signature {
            return self.data.to_vec();
        }
        // r = signer, s = offset of the dynamic part, v = 0
        let mut out = Vec::with_capacity(STATIC_PART_LEN);
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(self.signer.as_slice());
        out.extend_from_slice(&U256::from(dynamic_offset).to_be_bytes::<32>());
        out.push(0);
        out
    }

    fn dynamic_part(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.data.len());
        out.extend_from_slice(&U256::from(self.data.len()).to_be_bytes::<32>());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Signatures of a Safe operation keyed by owner.
///
/// Addresses compare byte-wise, so iteration order is the ascending (case-insensitive) hex
/// order Safe's `checkNSignatures` requires, whatever order signatures were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet(BTreeMap<Address, SafeSignature>);

impl SignatureSet {
    /// Adds a signature, replacing any previous one from the same signer.
    pub fn add(&mut self, signature: SafeSignature) {
        self.0.insert(signature.signer, signature);
    }

    /// The signature of `signer`, if present.
    #[must_use]
    pub fn get(&self, signer: &Address) -> Option<&SafeSignature> {
        self.0.get(signer)
    }

    /// Number of distinct signers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no signature was added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes every signature.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Signatures in encoding order.
    pub fn iter(&self) -> impl Iterator<Item = &SafeSignature> {
        self.0.values()
    }

    /// Encodes the signatures as Safe expects them.
    ///
    /// Static parts (65 bytes each) come first, sorted by signer. Each contract signature's
    /// static part points at its `length ++ data` entry in the trailing dynamic region; the
    /// offset counts from the start of the static region.
    ///
    /// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/Safe.sol#L274>
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let static_len = self.0.len() * STATIC_PART_LEN;
        let mut static_region = Vec::with_capacity(static_len);
        let mut dynamic_region = Vec::new();

        for signature in self.0.values() {
            static_region.extend(signature.static_part(static_len + dynamic_region.len()));
            if signature.is_contract_signature {
                dynamic_region.extend(signature.dynamic_part());
            }
        }

        static_region.extend(dynamic_region);
        static_region.into()
    }
}
