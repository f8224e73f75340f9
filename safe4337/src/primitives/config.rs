//! Deployment addresses per network and the module/EntryPoint compatibility table.
//!
//! Addresses are never assumed: every lookup goes through a [`ContractRegistry`] keyed by
//! `(chain_id, safe_modules_version)` and fails with [`ConfigError::AddressNotFound`] when a
//! network is not registered.

use std::{collections::HashMap, fmt};

use alloy::primitives::{address, Address};
use semver::Version;

/// The v0.6 `EntryPoint`, deployed at the same address on every network.
pub const ENTRY_POINT_V06: Address = address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// The v0.7 `EntryPoint`, deployed at the same address on every network.
pub const ENTRY_POINT_V07: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Modules version used when the caller does not pick one.
pub const DEFAULT_SAFE_MODULES_VERSION: &str = "0.3.0";

/// Oldest Safe singleton version able to run the 4337 module as fallback handler.
pub const MIN_SAFE_VERSION: &str = "1.4.1";

/// The two incompatible `EntryPoint` wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum EntryPointVersion {
    /// `EntryPoint` v0.6: `initCode`, packed `paymasterAndData`, `uint256` gas fields.
    V06,
    /// `EntryPoint` v0.7: separate factory and paymaster fields, `uint128` gas limits.
    V07,
}

impl EntryPointVersion {
    /// Resolves the version of a canonical `EntryPoint` address.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownEntryPoint` for any other address.
    pub fn from_address(entry_point: Address) -> Result<Self, ConfigError> {
        if entry_point == ENTRY_POINT_V06 {
            Ok(Self::V06)
        } else if entry_point == ENTRY_POINT_V07 {
            Ok(Self::V07)
        } else {
            Err(ConfigError::UnknownEntryPoint {
                address: entry_point.to_string(),
            })
        }
    }

    /// The canonical address of this `EntryPoint` version.
    #[must_use]
    pub const fn canonical_address(self) -> Address {
        match self {
            Self::V06 => ENTRY_POINT_V06,
            Self::V07 => ENTRY_POINT_V07,
        }
    }

    /// The `EntryPoint` version a given Safe 4337 modules release was built against.
    ///
    /// `0.2.x` targets v0.6, every release from `0.3.0` on targets v0.7.
    ///
    /// # Errors
    /// Returns `ConfigError::UnsupportedModulesVersion` for releases predating `0.2.0`.
    pub fn for_modules_version(version: &Version) -> Result<Self, ConfigError> {
        if *version >= Version::new(0, 3, 0) {
            Ok(Self::V07)
        } else if *version >= Version::new(0, 2, 0) {
            Ok(Self::V06)
        } else {
            Err(ConfigError::UnsupportedModulesVersion {
                version: version.to_string(),
            })
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V06 => write!(f, "v0.6"),
            Self::V07 => write!(f, "v0.7"),
        }
    }
}

/// Parses a semantic version, tolerating a leading `v`.
///
/// # Errors
/// Returns `ConfigError::InvalidVersion` if `raw` is not a semantic version.
pub fn parse_version(raw: &str) -> Result<Version, ConfigError> {
    let trimmed = raw.trim().trim_start_matches('v');
    // Safe contracts report two-component versions in some deployments ("1.4").
    let normalized = if trimmed.matches('.').count() == 1 {
        format!("{trimmed}.0")
    } else {
        trimmed.to_string()
    };
    Version::parse(&normalized).map_err(|e| ConfigError::InvalidVersion {
        version: raw.to_string(),
        message: e.to_string(),
    })
}

/// Every contract the pipeline talks to on one network for one modules release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Safe4337Contracts {
    /// The `Safe4337Module`, enabled as module and fallback handler on the account.
    pub safe_4337_module: Address,
    /// Helper enabling modules during `Safe.setup`.
    pub safe_module_setup: Address,
    /// The `EntryPoint` this module release validates against.
    pub entry_point: Address,
    /// `SafeProxyFactory` used for counterfactual deployment.
    pub proxy_factory: Address,
    /// Canonical Safe singleton.
    pub safe_singleton: Address,
    /// Safe singleton emitting L2 events.
    pub safe_l2_singleton: Address,
    /// `MultiSend`, allowing delegate calls inside batches.
    pub multi_send: Address,
    /// `MultiSendCallOnly`, rejecting delegate calls inside batches.
    pub multi_send_call_only: Address,
    /// Shared WebAuthn signer used as owner for passkeys.
    pub webauthn_shared_signer: Address,
}

impl Safe4337Contracts {
    /// Canonical deterministic deployment for the `0.2.0` modules release (`EntryPoint` v0.6).
    #[must_use]
    pub const fn canonical_v0_2_0() -> Self {
        Self {
            safe_4337_module: address!("0xa581c4A4DB7175302464fF3C06380BC3270b4037"),
            safe_module_setup: address!("0x8EcD4ec46D4D2a6B64fE960B3D64e8B94B2234eb"),
            entry_point: ENTRY_POINT_V06,
            ..Self::canonical_safe_1_4_1()
        }
    }

    /// Canonical deterministic deployment for the `0.3.0` modules release (`EntryPoint` v0.7).
    #[must_use]
    pub const fn canonical_v0_3_0() -> Self {
        Self {
            safe_4337_module: address!("0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226"),
            safe_module_setup: address!("0x2dd68b007B46fBe91B9A7c3EDa5A7a1063cB5b47"),
            entry_point: ENTRY_POINT_V07,
            ..Self::canonical_safe_1_4_1()
        }
    }

    const fn canonical_safe_1_4_1() -> Self {
        Self {
            safe_4337_module: Address::ZERO,
            safe_module_setup: Address::ZERO,
            entry_point: Address::ZERO,
            proxy_factory: address!("0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67"),
            safe_singleton: address!("0x41675C099F32341bf84BFc5382aF534df5C7461a"),
            safe_l2_singleton: address!("0x29fcB43b46531BcA003ddC8FCB67FFE91900C762"),
            multi_send: address!("0x38869bf66a61cF6bDB996A6aE40D5853Fd43B526"),
            multi_send_call_only: address!("0x9641d764fc13c8B624c04430C7356C1C7C8102e2"),
            webauthn_shared_signer: address!("0x94a4F6affBd8975951142c3999aEAB7ecee555c2"),
        }
    }

    /// Applies caller-supplied overrides on top of the registry entry.
    #[must_use]
    pub fn with_overrides(mut self, custom: &CustomContracts) -> Self {
        let overrides = [
            (&mut self.safe_4337_module, custom.safe_4337_module),
            (&mut self.safe_module_setup, custom.safe_module_setup),
            (&mut self.entry_point, custom.entry_point),
            (&mut self.proxy_factory, custom.proxy_factory),
            (&mut self.safe_singleton, custom.safe_singleton),
            (&mut self.multi_send, custom.multi_send),
            (&mut self.multi_send_call_only, custom.multi_send_call_only),
            (&mut self.webauthn_shared_signer, custom.webauthn_shared_signer),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }
        self
    }
}

/// Individual contract overrides, e.g. for local devnets or forced `EntryPoint`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomContracts {
    /// Forces the `EntryPoint`, skipping the bundler-based selection.
    pub entry_point: Option<Address>,
    /// Overrides the 4337 module.
    pub safe_4337_module: Option<Address>,
    /// Overrides the module setup helper.
    pub safe_module_setup: Option<Address>,
    /// Overrides the proxy factory.
    pub proxy_factory: Option<Address>,
    /// Overrides the Safe singleton (both canonical and L2 deployments).
    pub safe_singleton: Option<Address>,
    /// Overrides `MultiSend`.
    pub multi_send: Option<Address>,
    /// Overrides `MultiSendCallOnly`.
    pub multi_send_call_only: Option<Address>,
    /// Overrides the shared WebAuthn signer.
    pub webauthn_shared_signer: Option<Address>,
}

/// Explicit lookup structure mapping `(chain_id, modules version)` to deployments.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    entries: HashMap<(u64, Version), Safe4337Contracts>,
}

impl ContractRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the canonical `0.2.0` and `0.3.0` deployments on each chain in `chain_ids`.
    #[must_use]
    pub fn with_canonical_deployments(chain_ids: &[u64]) -> Self {
        let mut registry = Self::new();
        for &chain_id in chain_ids {
            registry.insert(chain_id, Version::new(0, 2, 0), Safe4337Contracts::canonical_v0_2_0());
            registry.insert(chain_id, Version::new(0, 3, 0), Safe4337Contracts::canonical_v0_3_0());
        }
        registry
    }

    /// Registers (or replaces) the deployment for a network and modules version.
    pub fn insert(&mut self, chain_id: u64, modules_version: Version, contracts: Safe4337Contracts) {
        self.entries.insert((chain_id, modules_version), contracts);
    }

    /// Looks up the deployment for a network and modules version.
    ///
    /// # Errors
    /// Returns `ConfigError::AddressNotFound` when the pair is not registered.
    pub fn resolve(
        &self,
        chain_id: u64,
        modules_version: &Version,
    ) -> Result<Safe4337Contracts, ConfigError> {
        self.entries
            .get(&(chain_id, modules_version.clone()))
            .cloned()
            .ok_or_else(|| ConfigError::AddressNotFound {
                chain_id,
                modules_version: modules_version.to_string(),
            })
    }
}

/// Configuration errors.
#[crate::safe4337_error]
pub enum ConfigError {
    /// No deployment registered for the network/modules pair.
    #[error("address not found for this network: no Safe 4337 deployment registered for chain {chain_id} and modules version {modules_version}")]
    AddressNotFound {
        /// Requested chain.
        chain_id: u64,
        /// Requested modules version.
        modules_version: String,
    },
    /// The address is not one of the known `EntryPoint`s.
    #[error("unknown entry point {address}")]
    UnknownEntryPoint {
        /// The unrecognized address.
        address: String,
    },
    /// Modules release predating 4337 support in this crate.
    #[error("unsupported Safe modules version {version}")]
    UnsupportedModulesVersion {
        /// The rejected version.
        version: String,
    },
    /// Not a semantic version.
    #[error("invalid version {version}: {message}")]
    InvalidVersion {
        /// The raw input.
        version: String,
        /// Parser error.
        message: String,
    },
}
