use std::sync::Arc;

use alloy::primitives::{Address, U256};

use super::analytics::OnchainAnalytics;
use crate::{
    fee_estimator::{FeeEstimator, PaymasterOptions},
    primitives::config::{ContractRegistry, CustomContracts, MIN_SAFE_VERSION},
    rpc::SafeProvider,
    signer::OwnerSigner,
};

/// Validation gas each required signature adds on top of the single-signature estimate.
pub const DEFAULT_PER_OWNER_VERIFICATION_OVERHEAD: u64 = 10_000;

/// Which singleton a new Safe proxies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Enum)]
pub enum DeploymentType {
    /// `Safe`
    #[default]
    Canonical,
    /// `SafeL2`, emitting events for indexers.
    L2,
}

/// A Safe that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedSafeOptions {
    /// Initial owners.
    pub owners: Vec<Address>,
    /// Signatures required.
    pub threshold: u64,
    /// CREATE2 salt nonce.
    pub salt_nonce: U256,
    /// Safe singleton version, at least `1.4.1`.
    pub safe_version: String,
    /// Singleton flavour.
    pub deployment_type: DeploymentType,
}

impl PredictedSafeOptions {
    /// A 1.4.1 canonical Safe with salt nonce 0.
    #[must_use]
    pub fn new(owners: Vec<Address>, threshold: u64) -> Self {
        Self {
            owners,
            threshold,
            salt_nonce: U256::ZERO,
            safe_version: MIN_SAFE_VERSION.to_string(),
            deployment_type: DeploymentType::Canonical,
        }
    }
}

/// The account the pack operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeAccountOptions {
    /// A deployed Safe.
    Existing {
        /// Its address.
        safe_address: Address,
    },
    /// A Safe deployed by its first operation.
    New(PredictedSafeOptions),
}

/// Everything [`super::Safe4337Pack::init`] needs.
#[derive(Debug, Clone)]
pub struct Safe4337Config {
    /// Node access.
    pub provider: Arc<dyn SafeProvider>,
    /// The owner signing through this pack.
    pub signer: OwnerSigner,
    /// Bundler endpoint.
    pub bundler_url: String,
    /// Safe 4337 modules release, `0.3.0` by default.
    pub safe_modules_version: Option<String>,
    /// Individual contract overrides.
    pub custom_contracts: Option<CustomContracts>,
    /// The account.
    pub options: SafeAccountOptions,
    /// Paymaster, if gas is not paid by the Safe itself.
    pub paymaster_options: Option<PaymasterOptions>,
    /// Attribution appended to every operation.
    pub onchain_analytics: Option<OnchainAnalytics>,
    /// Deployments per network; the canonical ones for the provider's chain by default.
    pub contract_registry: Option<ContractRegistry>,
    /// Estimation hooks; a [`crate::fee_estimator::GenericFeeEstimator`] on `provider` by default.
    pub fee_estimator: Option<Arc<dyn FeeEstimator>>,
    /// Added to `verificationGasLimit` per required signature.
    pub per_owner_verification_overhead: u64,
}

impl Safe4337Config {
    /// A configuration with every optional field unset.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SafeProvider>,
        signer: OwnerSigner,
        bundler_url: impl Into<String>,
        options: SafeAccountOptions,
    ) -> Self {
        Self {
            provider,
            signer,
            bundler_url: bundler_url.into(),
            safe_modules_version: None,
            custom_contracts: None,
            options,
            paymaster_options: None,
            onchain_analytics: None,
            contract_registry: None,
            fee_estimator: None,
            per_owner_verification_overhead: DEFAULT_PER_OWNER_VERIFICATION_OVERHEAD,
        }
    }
}

/// Per-operation options of [`super::Safe4337Pack::create_transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Earliest validity timestamp (seconds), 0 by default.
    pub valid_after: Option<u64>,
    /// Latest validity timestamp (seconds), 0 (unbounded) by default.
    pub valid_until: Option<u64>,
    /// Raw nonce, e.g. [`crate::operation::nonce::NonceLane::encode`] of an independent lane.
    /// The next nonce of the default lane by default.
    pub custom_nonce: Option<U256>,
    /// Gas token replacing the configured ERC-20 paymaster token.
    pub paymaster_token_address: Option<Address>,
}
