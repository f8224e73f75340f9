use std::{fmt::Display, str::FromStr};

use alloy::primitives::{Address, Bytes, FixedBytes, U128, U256};
use safe4337_macros::safe4337_export;

/// Logging facade wired to a foreign logger.
pub mod logger;

/// Network-scoped contract registry and version compatibility rules.
pub mod config;

/// A wrapper around hex-encoded bytes (may or may not be a number).
///
/// The output is always prefixed with "0x".
///
/// # Examples
/// ```
/// use safe4337::primitives::HexEncodedData;
/// let hex_string = HexEncodedData::new("0x1234567890abcdef");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Object)]
pub struct HexEncodedData(String);

#[safe4337_export]
impl HexEncodedData {
    /// Initializes a new `HexEncodedData` from a hex string, with or without the "0x" prefix.
    ///
    /// # Errors
    /// - `PrimitiveError::InvalidHexString` if the provided string is not validly encoded hex data.
    #[uniffi::constructor]
    pub fn new(s: &str) -> Result<Self, PrimitiveError> {
        let s = s.trim_start_matches("0x");
        hex::decode(s).map_err(|_| PrimitiveError::InvalidHexString(s.to_string()))?;
        Ok(Self(format!("0x{}", s.to_lowercase())))
    }

    /// Returns the wrapped hex string.
    #[must_use]
    pub fn to_hex_string(&self) -> String {
        self.0.clone()
    }
}

impl HexEncodedData {
    /// Returns the wrapped hex string as a &str.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the wrapped string into raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        // validated at construction
        Bytes::from(hex::decode(&self.0[2..]).unwrap_or_default())
    }
}

impl Display for HexEncodedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<HexEncodedData> for String {
    fn from(hex_encoded_string: HexEncodedData) -> Self {
        hex_encoded_string.0
    }
}

impl From<&[u8]> for HexEncodedData {
    fn from(bytes: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }
}

impl TryFrom<&str> for HexEncodedData {
    type Error = PrimitiveError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

/// Errors raised while parsing or validating primitive values.
#[crate::safe4337_error]
pub enum PrimitiveError {
    /// The provided string is not validly encoded hex data.
    #[error("invalid hex string: {0}")]
    InvalidHexString(String),
    /// A value received from a foreign caller could not be parsed.
    #[error("invalid input on {attribute}: {message}")]
    InvalidInput {
        /// Name of the offending attribute.
        attribute: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

/// Parses string values received over FFI (or JSON) into strongly typed Solidity primitives.
///
/// `attribute` names the field so errors can point at the offending input.
pub trait ParseFromForeignBinding: Sized {
    /// Parses `value` into `Self`.
    ///
    /// # Errors
    /// Returns `PrimitiveError::InvalidInput` if `value` does not represent a valid `Self`.
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError>;
}

impl ParseFromForeignBinding for Address {
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        Self::from_str(value.trim()).map_err(|e| PrimitiveError::InvalidInput {
            attribute,
            message: e.to_string(),
        })
    }
}

impl ParseFromForeignBinding for U256 {
    /// Accepts `0x`-prefixed hex or decimal.
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        Self::from_str(value.trim()).map_err(|e| PrimitiveError::InvalidInput {
            attribute,
            message: e.to_string(),
        })
    }
}

impl ParseFromForeignBinding for U128 {
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        Self::from_str(value.trim()).map_err(|e| PrimitiveError::InvalidInput {
            attribute,
            message: e.to_string(),
        })
    }
}

impl ParseFromForeignBinding for Bytes {
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::new());
        }
        Self::from_str(value).map_err(|e| PrimitiveError::InvalidInput {
            attribute,
            message: e.to_string(),
        })
    }
}

impl ParseFromForeignBinding for FixedBytes<32> {
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        Self::from_str(value.trim()).map_err(|e| PrimitiveError::InvalidInput {
            attribute,
            message: e.to_string(),
        })
    }
}

impl ParseFromForeignBinding for u64 {
    fn parse_from_ffi(value: &str, attribute: &'static str) -> Result<Self, PrimitiveError> {
        let parsed = U256::parse_from_ffi(value, attribute)?;
        Self::try_from(parsed).map_err(|_| PrimitiveError::InvalidInput {
            attribute,
            message: format!("{value} does not fit in 64 bits"),
        })
    }
}

/// Narrows a `U256` quantity into `u128`, the width of v0.7 gas fields.
///
/// # Errors
/// Returns `PrimitiveError::InvalidInput` if the value exceeds `u128::MAX`.
pub fn to_u128(value: U256, attribute: &'static str) -> Result<u128, PrimitiveError> {
    u128::try_from(value).map_err(|_| PrimitiveError::InvalidInput {
        attribute,
        message: format!("{value} does not fit in 128 bits"),
    })
}
