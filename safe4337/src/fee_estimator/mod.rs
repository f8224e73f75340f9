//! Two-phase gas and paymaster estimation.
//!
//! A user operation is estimated in three stages:
//! 1. [`FeeEstimator::pre_estimate`]: gas prices and, when a paymaster is configured, a paymaster
//!    stub quote so the bundler accounts for paymaster validation.
//! 2. The bundler's own `eth_estimateUserOperationGas` (run by the pack).
//! 3. [`FeeEstimator::post_estimate`]: the paymaster's final quote for the estimated limits.
//!
//! Vendor specific paymaster methods are only ever called from the estimators in this module.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::{
    operation::{EstimateGasData, UserOperation},
    rpc::{PaymasterContext, ProviderError, RpcError},
};

mod generic;
mod pimlico;

pub use generic::{GasPriceMultipliers, GenericFeeEstimator};
pub use pimlico::PimlicoFeeEstimator;

/// How gas is paid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymasterOptions {
    /// A sponsor pays, under an optional policy.
    Sponsored {
        /// Paymaster service endpoint.
        paymaster_url: String,
        /// Policy selecting the sponsor.
        sponsorship_policy_id: Option<String>,
    },
    /// Gas is paid in an ERC-20 token pulled by the paymaster.
    Erc20 {
        /// Paymaster service endpoint.
        paymaster_url: String,
        /// The paymaster contract, spender of the token allowance.
        paymaster_address: Address,
        /// Token gas is paid in.
        paymaster_token_address: Address,
        /// Allowance granted to the paymaster before the user's calls, if any.
        amount_to_approve: Option<U256>,
    },
}

impl PaymasterOptions {
    /// The paymaster service endpoint.
    #[must_use]
    pub fn paymaster_url(&self) -> &str {
        match self {
            Self::Sponsored { paymaster_url, .. } | Self::Erc20 { paymaster_url, .. } => {
                paymaster_url
            }
        }
    }

    /// Whether the operation is sponsored.
    #[must_use]
    pub const fn is_sponsored(&self) -> bool {
        matches!(self, Self::Sponsored { .. })
    }

    /// Replaces the gas token. Only ERC-20 options carry one.
    #[must_use]
    pub fn with_token(mut self, token: Address) -> Self {
        if let Self::Erc20 {
            paymaster_token_address,
            ..
        } = &mut self
        {
            *paymaster_token_address = token;
        }
        self
    }

    /// The `approve(paymaster, amount)` the first operation must carry, if any.
    #[must_use]
    pub fn approval(&self) -> Option<(Address, Address, U256)> {
        match self {
            Self::Erc20 {
                paymaster_address,
                paymaster_token_address,
                amount_to_approve: Some(amount),
                ..
            } if !amount.is_zero() => Some((*paymaster_token_address, *paymaster_address, *amount)),
            _ => None,
        }
    }

    /// The context sent along paymaster requests.
    #[must_use]
    pub fn context(&self) -> PaymasterContext {
        match self {
            Self::Sponsored {
                sponsorship_policy_id,
                ..
            } => PaymasterContext {
                sponsorship_policy_id: sponsorship_policy_id.clone(),
                token: None,
            },
            Self::Erc20 {
                paymaster_token_address,
                ..
            } => PaymasterContext {
                sponsorship_policy_id: None,
                token: Some(*paymaster_token_address),
            },
        }
    }
}

/// Everything an estimation hook sees.
#[derive(Debug, Clone)]
pub struct EstimationContext {
    /// The operation as it stands, carrying dummy signatures.
    pub user_operation: UserOperation,
    /// `EntryPoint` the operation targets.
    pub entry_point: Address,
    /// Chain the operation runs on.
    pub chain_id: u64,
    /// Paymaster configuration of this operation, if any.
    pub paymaster_options: Option<PaymasterOptions>,
}

/// Hooks around the bundler's estimation.
///
/// Both hooks default to producing nothing. Without paymaster options the paymaster part of
/// both hooks is skipped.
#[async_trait]
pub trait FeeEstimator: Send + Sync + std::fmt::Debug {
    /// Runs before `eth_estimateUserOperationGas`.
    ///
    /// # Errors
    /// Propagates node, bundler and paymaster failures unchanged.
    async fn pre_estimate(
        &self,
        _context: &EstimationContext,
    ) -> Result<EstimateGasData, FeeEstimationError> {
        Ok(EstimateGasData::default())
    }

    /// Runs after `eth_estimateUserOperationGas`.
    ///
    /// # Errors
    /// Propagates paymaster failures unchanged.
    async fn post_estimate(
        &self,
        _context: &EstimationContext,
    ) -> Result<EstimateGasData, FeeEstimationError> {
        Ok(EstimateGasData::default())
    }
}

/// Errors raised by an estimation hook.
#[crate::safe4337_error]
pub enum FeeEstimationError {
    /// The bundler or paymaster answered with an error.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The node could not provide gas prices.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
