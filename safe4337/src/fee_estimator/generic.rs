use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use super::{EstimationContext, FeeEstimationError, FeeEstimator};
use crate::{
    operation::EstimateGasData,
    rpc::{PaymasterClient, SafeProvider},
};

/// Scaling applied to the node's gas prices, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPriceMultipliers {
    /// Applied to `eth_gasPrice` to obtain `maxFeePerGas`.
    pub max_fee_per_gas_percent: u64,
    /// Applied to `eth_maxPriorityFeePerGas`.
    pub max_priority_fee_per_gas_percent: u64,
}

impl Default for GasPriceMultipliers {
    fn default() -> Self {
        Self {
            max_fee_per_gas_percent: 150,
            max_priority_fee_per_gas_percent: 150,
        }
    }
}

impl GasPriceMultipliers {
    /// `(maxFeePerGas, maxPriorityFeePerGas)` from raw node prices. The fee cap never falls
    /// below the tip.
    #[must_use]
    pub fn apply(&self, gas_price: U256, max_priority_fee_per_gas: U256) -> (U256, U256) {
        let scale = |value: U256, percent: u64| {
            value.saturating_mul(U256::from(percent)) / U256::from(100)
        };
        let priority = scale(max_priority_fee_per_gas, self.max_priority_fee_per_gas_percent);
        let max_fee = scale(gas_price, self.max_fee_per_gas_percent).max(priority);
        (max_fee, priority)
    }
}

/// Vendor neutral estimator: node gas prices plus ERC-7677 paymaster quotes.
#[derive(Debug, Clone)]
pub struct GenericFeeEstimator {
    provider: Arc<dyn SafeProvider>,
    multipliers: GasPriceMultipliers,
}

impl GenericFeeEstimator {
    /// Creates an estimator reading gas prices from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn SafeProvider>, multipliers: GasPriceMultipliers) -> Self {
        Self {
            provider,
            multipliers,
        }
    }
}

#[async_trait]
impl FeeEstimator for GenericFeeEstimator {
    async fn pre_estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<EstimateGasData, FeeEstimationError> {
        let gas_price = self.provider.gas_price().await?;
        let priority = self.provider.max_priority_fee_per_gas().await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.multipliers.apply(gas_price, priority);
        crate::debug!(
            "fee_estimator.gas_price max_fee_per_gas={max_fee_per_gas} max_priority_fee_per_gas={max_priority_fee_per_gas}"
        );

        let prices = EstimateGasData {
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            ..EstimateGasData::default()
        };

        let Some(paymaster_options) = &context.paymaster_options else {
            return Ok(prices);
        };
        let paymaster = PaymasterClient::new(paymaster_options.paymaster_url())?;
        crate::debug!("fee_estimator.paymaster_stub host={}", paymaster.host());
        let stub = paymaster
            .get_paymaster_stub_data(
                &context.user_operation,
                context.entry_point,
                context.chain_id,
                &paymaster_options.context(),
            )
            .await?;
        Ok(prices.overlay(stub))
    }

    async fn post_estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<EstimateGasData, FeeEstimationError> {
        let Some(paymaster_options) = &context.paymaster_options else {
            return Ok(EstimateGasData::default());
        };
        let paymaster = PaymasterClient::new(paymaster_options.paymaster_url())?;
        crate::debug!("fee_estimator.paymaster_data host={}", paymaster.host());
        Ok(paymaster
            .get_paymaster_data(
                &context.user_operation,
                context.entry_point,
                context.chain_id,
                &paymaster_options.context(),
            )
            .await?)
    }
}
