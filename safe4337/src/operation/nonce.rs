//! Two-dimensional `EntryPoint` nonces.
//!
//! Layout (24-byte key + 8-byte sequence):
//! [0..=23]   : lane key; the `EntryPoint` tracks one sequence per key
//! [24..=31]  : sequence within the lane
//!
//! Operations on different lanes never conflict, so they can be built and submitted
//! concurrently from the same account.

use alloy::primitives::U256;
use ruint::aliases::U192;

/// A `{key, sequence}` nonce lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NonceLane {
    /// Lane key. Key 0 is the sequential default lane.
    pub key: U192,
    /// Position within the lane.
    pub sequence: u64,
}

impl NonceLane {
    /// The default lane at `sequence`.
    #[must_use]
    pub const fn default_lane(sequence: u64) -> Self {
        Self {
            key: U192::ZERO,
            sequence,
        }
    }

    /// A lane with a random non-zero key, starting at sequence 0.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes: [u8; 24] = rand::random();
        // keep clear of the default lane
        bytes[0] |= 0x80;
        Self {
            key: U192::from_be_bytes(bytes),
            sequence: 0,
        }
    }

    /// Packs the lane into the raw `uint256` nonce: `key << 64 | sequence`.
    #[must_use]
    pub fn encode(self) -> U256 {
        (U256::from(self.key) << 64) | U256::from(self.sequence)
    }

    /// Splits a raw nonce into its lane.
    #[must_use]
    pub fn decode(nonce: U256) -> Self {
        let sequence = u64::try_from(nonce & U256::from(u64::MAX)).unwrap_or_default();
        Self {
            key: U192::from(nonce >> 64),
            sequence,
        }
    }
}
