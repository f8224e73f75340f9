use alloy::primitives::{keccak256, Bytes};

/// Marker opening every identifier.
const PREFIX: [u8; 2] = [0x5a, 0xfe];

/// Identifier layout version.
const IDENTIFIER_VERSION: u8 = 0x00;

const TOOL: &str = "safe4337";

/// Attribution appended to the `callData` of every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnchainAnalytics {
    /// Project name.
    pub project: String,
    /// Platform the operation is built on, `Web` by default.
    pub platform: Option<String>,
}

impl OnchainAnalytics {
    /// `5afe ++ 00 ++ h20(project) ++ h3(platform) ++ h3(tool) ++ h3(tool_version)`, where
    /// `hN` is the last N bytes of the keccak of the UTF-8 input.
    #[must_use]
    pub fn identifier(&self) -> Bytes {
        let platform = self.platform.as_deref().unwrap_or("Web");
        let mut identifier = Vec::with_capacity(32);
        identifier.extend_from_slice(&PREFIX);
        identifier.push(IDENTIFIER_VERSION);
        identifier.extend_from_slice(&hash_tail(&self.project, 20));
        identifier.extend_from_slice(&hash_tail(platform, 3));
        identifier.extend_from_slice(&hash_tail(TOOL, 3));
        identifier.extend_from_slice(&hash_tail(env!("CARGO_PKG_VERSION"), 3));
        identifier.into()
    }
}

fn hash_tail(input: &str, len: usize) -> Vec<u8> {
    keccak256(input.as_bytes())[32 - len..].to_vec()
}
