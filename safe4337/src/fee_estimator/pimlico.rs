use async_trait::async_trait;

use super::{EstimationContext, FeeEstimationError, FeeEstimator, PaymasterOptions};
use crate::{
    operation::EstimateGasData,
    rpc::{PaymasterClient, RpcError},
};

/// Estimator for Pimlico bundlers and paymasters.
///
/// Gas prices come from the bundler's `pimlico_getUserOperationGasPrice` (`fast` tier).
/// Sponsored operations are finalized with `pm_sponsorUserOperation`, which also returns the
/// sponsorship-validated gas limits; ERC-20 operations with `pm_getPaymasterData`.
#[derive(Debug, Clone)]
pub struct PimlicoFeeEstimator {
    gas_oracle: PaymasterClient,
}

impl PimlicoFeeEstimator {
    /// Creates an estimator asking the bundler at `bundler_url` for gas prices.
    ///
    /// # Errors
    /// Returns `RpcError::InvalidUrl` for rejected URLs.
    pub fn new(bundler_url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            gas_oracle: PaymasterClient::new(bundler_url)?,
        })
    }
}

#[async_trait]
impl FeeEstimator for PimlicoFeeEstimator {
    async fn pre_estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<EstimateGasData, FeeEstimationError> {
        let tiers = self.gas_oracle.get_user_operation_gas_price().await?;
        crate::debug!(
            "fee_estimator.gas_price tier=fast max_fee_per_gas={} max_priority_fee_per_gas={}",
            tiers.fast.max_fee_per_gas,
            tiers.fast.max_priority_fee_per_gas
        );
        let prices = EstimateGasData {
            max_fee_per_gas: Some(tiers.fast.max_fee_per_gas),
            max_priority_fee_per_gas: Some(tiers.fast.max_priority_fee_per_gas),
            ..EstimateGasData::default()
        };

        let Some(paymaster_options) = &context.paymaster_options else {
            return Ok(prices);
        };
        let paymaster = PaymasterClient::new(paymaster_options.paymaster_url())?;
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
        let paymaster_context = paymaster_options.context();

        let data = match paymaster_options {
            PaymasterOptions::Sponsored { .. } => {
                crate::debug!("fee_estimator.sponsor host={}", paymaster.host());
                paymaster
                    .sponsor_user_operation(
                        &context.user_operation,
                        context.entry_point,
                        &paymaster_context,
                    )
                    .await?
            }
            PaymasterOptions::Erc20 { .. } => {
                crate::debug!("fee_estimator.paymaster_data host={}", paymaster.host());
                paymaster
                    .get_paymaster_data(
                        &context.user_operation,
                        context.entry_point,
                        context.chain_id,
                        &paymaster_context,
                    )
                    .await?
            }
        };
        Ok(data)
    }
}
