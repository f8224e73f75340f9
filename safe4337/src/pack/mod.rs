//! The `Safe4337Pack` façade.
//!
//! Sequences the whole pipeline for one Safe:
//! `init` (compatibility checks, `EntryPoint` selection, counterfactual deployment) →
//! `create_transaction` (encode, build, estimate) → `sign_safe_operation` (one owner at a time)
//! → `execute_transaction` (hand over to the bundler).
//!
//! The pack is configured once and never mutated afterwards; every method takes `&self`.
//! Operations built from distinct nonce lanes can be prepared concurrently.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use ruint::aliases::U192;

use crate::{
    fee_estimator::{
        EstimationContext, FeeEstimationError, FeeEstimator, GasPriceMultipliers,
        GenericFeeEstimator, PaymasterOptions,
    },
    operation::{
        nonce::NonceLane, response::SafeOperationResponse, EstimateGasData, OperationError,
        SafeOperation, SafeOperationOptions, SignatureSet, UserOperationDraft,
    },
    primitives::config::{
        parse_version, ConfigError, ContractRegistry, EntryPointVersion, Safe4337Contracts,
        DEFAULT_SAFE_MODULES_VERSION, MIN_SAFE_VERSION,
    },
    rpc::{
        BundlerClient, PaymasterClient, ProviderError, RpcError, SafeProvider, TokenQuote,
        UserOperationByHash, UserOperationReceipt,
    },
    signer::{passkey, OwnerSigner, SignerError, SigningMethod},
    transaction::{contracts::IErc20, encode_calls, EncodingError, MetaTransaction},
};

/// Onchain attribution identifier.
pub mod analytics;

/// Pack configuration.
pub mod config;

/// Counterfactual deployment.
pub mod deployment;

pub use analytics::OnchainAnalytics;
pub use config::{
    DeploymentType, PredictedSafeOptions, Safe4337Config, SafeAccountOptions, TransactionOptions,
    DEFAULT_PER_OWNER_VERIFICATION_OVERHEAD,
};
pub use deployment::SafeDeployment;

/// An operation to sign or submit: built by this pack, or fetched from the indexing service.
#[derive(Debug, Clone)]
pub enum SafeOperationInput {
    /// Built locally.
    Local(SafeOperation),
    /// A record of the Safe operation indexing service.
    Indexed(Box<SafeOperationResponse>),
}

impl From<SafeOperation> for SafeOperationInput {
    fn from(operation: SafeOperation) -> Self {
        Self::Local(operation)
    }
}

impl From<SafeOperationResponse> for SafeOperationInput {
    fn from(response: SafeOperationResponse) -> Self {
        Self::Indexed(Box::new(response))
    }
}

/// Outcome of an included operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOperationStatus {
    /// The calls executed.
    Confirmed(UserOperationReceipt),
    /// Included, but the execution phase reverted.
    Failed(UserOperationReceipt),
}

/// Builds, estimates, signs and submits user operations for one Safe.
#[derive(Debug, Clone)]
pub struct Safe4337Pack {
    provider: Arc<dyn SafeProvider>,
    signer: OwnerSigner,
    bundler: BundlerClient,
    fee_estimator: Arc<dyn FeeEstimator>,
    chain_id: u64,
    safe_address: Address,
    contracts: Safe4337Contracts,
    entry_point: Address,
    deployment: Option<SafeDeployment>,
    paymaster_options: Option<PaymasterOptions>,
    analytics_identifier: Option<Bytes>,
    per_owner_verification_overhead: u64,
}

#[crate::safe4337_export(local)]
impl Safe4337Pack {
    /// Resolves contracts, selects the `EntryPoint` and checks the account.
    ///
    /// # Errors
    /// - `PackError::Compatibility` if the Safe, its module setup or the bundler cannot run
    ///   the configured modules release.
    /// - `PackError::Config` if no deployment is registered for the network.
    /// - `PackError::InvalidOptions` for an invalid new-Safe configuration.
    /// - `PackError::Provider` / `PackError::Rpc` on node or bundler failures.
    pub async fn init(config: Safe4337Config) -> Result<Self, PackError> {
        let bundler = BundlerClient::new(&config.bundler_url)?;
        let chain_id = config.provider.chain_id().await?;

        let modules_version = parse_version(
            config
                .safe_modules_version
                .as_deref()
                .unwrap_or(DEFAULT_SAFE_MODULES_VERSION),
        )?;
        let required_version = EntryPointVersion::for_modules_version(&modules_version)?;

        let registry = config
            .contract_registry
            .clone()
            .unwrap_or_else(|| ContractRegistry::with_canonical_deployments(&[chain_id]));
        let custom = config.custom_contracts.clone().unwrap_or_default();
        let mut contracts = registry
            .resolve(chain_id, &modules_version)?
            .with_overrides(&custom);

        let entry_point = if let Some(forced) = custom.entry_point {
            let forced_version = EntryPointVersion::from_address(forced)?;
            if forced_version != required_version {
                return Err(PackError::Compatibility {
                    message: format!(
                        "Incompatibility detected: entry point {forced} ({forced_version}) is not compatible with Safe modules version {modules_version}"
                    ),
                });
            }
            forced
        } else {
            let supported = bundler.supported_entry_points().await?;
            supported
                .into_iter()
                .find(|entry_point| {
                    EntryPointVersion::from_address(*entry_point)
                        .is_ok_and(|version| version == required_version)
                })
                .ok_or_else(|| PackError::Compatibility {
                    message: format!(
                        "Incompatibility detected: None of the entrypoints provided by the bundler is compatible with the Safe modules version {modules_version}"
                    ),
                })?
        };
        contracts.entry_point = entry_point;
        crate::info!(
            "pack.init.entry_point_selected entry_point={entry_point} version={required_version} bundler={}",
            bundler.host()
        );

        let (safe_address, deployment) = match &config.options {
            SafeAccountOptions::Existing { safe_address } => {
                check_existing_safe(config.provider.as_ref(), *safe_address, &contracts).await?;
                (*safe_address, None)
            }
            SafeAccountOptions::New(options) => {
                let deployment = prepare_new_safe(
                    config.provider.as_ref(),
                    &config.signer,
                    &contracts,
                    options,
                    config.paymaster_options.as_ref(),
                )
                .await?;
                crate::info!(
                    "pack.init.counterfactual safe={} threshold={}",
                    deployment.safe_address,
                    deployment.threshold
                );
                (deployment.safe_address, Some(deployment))
            }
        };

        let fee_estimator = config.fee_estimator.clone().unwrap_or_else(|| {
            Arc::new(GenericFeeEstimator::new(
                config.provider.clone(),
                GasPriceMultipliers::default(),
            ))
        });

        Ok(Self {
            provider: config.provider,
            signer: config.signer,
            bundler,
            fee_estimator,
            chain_id,
            safe_address,
            contracts,
            entry_point,
            deployment,
            paymaster_options: config.paymaster_options,
            analytics_identifier: config.onchain_analytics.as_ref().map(OnchainAnalytics::identifier),
            per_owner_verification_overhead: config.per_owner_verification_overhead,
        })
    }

    /// Encodes `transactions` into an estimated, unsigned Safe operation.
    ///
    /// With an ERC-20 paymaster and an allowance to grant, an `approve` precedes the calls unless
    /// the operation deploys the Safe, whose setup already grants it.
    ///
    /// # Errors
    /// - `PackError::Encoding` for an empty batch.
    /// - `PackError::InvalidOptions` when the gas token is overridden before the deployment that
    ///   approves the configured token.
    /// - `PackError::Estimation` when the bundler or paymaster rejects the estimation.
    /// - `PackError::Provider` on node failures.
    pub async fn create_transaction(
        &self,
        transactions: Vec<MetaTransaction>,
        options: TransactionOptions,
    ) -> Result<SafeOperation, PackError> {
        if transactions.is_empty() {
            return Err(EncodingError::EmptyBatch.into());
        }

        let paymaster_options = self.paymaster_options.clone().map(|paymaster| {
            match options.paymaster_token_address {
                Some(token) => paymaster.with_token(token),
                None => paymaster,
            }
        });

        let is_deployed = self.provider.is_deployed(self.safe_address).await?;
        let deployment = self.deployment.as_ref().filter(|_| !is_deployed);

        // the setup approve is part of the predicted address and cannot follow the override
        let setup_token = self
            .paymaster_options
            .as_ref()
            .and_then(PaymasterOptions::approval)
            .map(|(token, _, _)| token);
        if let (Some(_), Some(setup_token), Some(token)) =
            (deployment, setup_token, options.paymaster_token_address)
        {
            if token != setup_token {
                return Err(PackError::InvalidOptions {
                    message: format!(
                        "gas token {token} differs from {setup_token}, approved by the pending deployment"
                    ),
                });
            }
        }

        let mut calls = Vec::with_capacity(transactions.len() + 1);
        if let Some((token, spender, amount)) = paymaster_options.as_ref().and_then(PaymasterOptions::approval) {
            if deployment.is_none() {
                calls.push(MetaTransaction::call(
                    token,
                    U256::ZERO,
                    IErc20::approveCall {
                        spender,
                        value: amount,
                    }
                    .abi_encode()
                    .into(),
                ));
            }
        }
        calls.extend(transactions);

        let nonce = match options.custom_nonce {
            Some(nonce) => nonce,
            None => {
                self.provider
                    .get_nonce(self.entry_point, self.safe_address, U192::ZERO)
                    .await?
            }
        };

        let mut call_data = encode_calls(
            &calls,
            self.contracts.multi_send,
            self.contracts.multi_send_call_only,
        )?
        .to_vec();
        if let Some(identifier) = &self.analytics_identifier {
            call_data.extend_from_slice(identifier);
        }

        let mut draft = UserOperationDraft::new(self.safe_address, nonce, call_data.into());
        if let Some(deployment) = deployment {
            draft = draft.with_factory(deployment.factory, deployment.factory_data.clone());
        }

        let mut operation = SafeOperation::new(
            draft,
            SafeOperationOptions {
                chain_id: self.chain_id,
                module_address: self.contracts.safe_4337_module,
                entry_point: self.entry_point,
                valid_after: options.valid_after.unwrap_or_default(),
                valid_until: options.valid_until.unwrap_or_default(),
            },
        )?;

        let threshold = match deployment {
            Some(deployment) => deployment.threshold,
            None => self.provider.threshold(self.safe_address).await?,
        };

        crate::debug!(
            "pack.create_transaction calls={} nonce={nonce} deploys={} threshold={threshold}",
            calls.len(),
            deployment.is_some()
        );
        self.estimate(&mut operation, threshold, paymaster_options)
            .await?;
        Ok(operation)
    }

    /// Adds the active owner's signature.
    ///
    /// # Errors
    /// - `PackError::ForeignOperation` if the operation targets another Safe, `EntryPoint` or chain.
    /// - `PackError::NotAnOwner` if the signer does not own the Safe.
    /// - `PackError::SigningUnsupported` if the key supports no typed-data signing method.
    /// - `PackError::Operation` if an indexing-service record cannot be normalized.
    pub async fn sign_safe_operation(
        &self,
        operation: SafeOperationInput,
        method: SigningMethod,
    ) -> Result<SafeOperation, PackError> {
        let mut operation = self.normalize(operation)?;
        let shared_signer = self.contracts.webauthn_shared_signer;
        let owner = self.signer.owner_address(shared_signer);

        let is_owner = if self.provider.is_deployed(self.safe_address).await? {
            self.provider.owners(self.safe_address).await?.contains(&owner)
        } else {
            self.deployment
                .as_ref()
                .is_some_and(|deployment| deployment.owners.contains(&owner))
                || self.signer.is_passkey()
        };
        if !is_owner {
            return Err(PackError::NotAnOwner {
                signer: owner.to_string(),
                safe: self.safe_address.to_string(),
            });
        }

        let signature = self
            .signer
            .sign(&operation, method, shared_signer)
            .await
            .map_err(|e| match e {
                SignerError::SigningUnsupported { signer } => PackError::SigningUnsupported { signer },
                other => PackError::Signer(other),
            })?;
        crate::debug!(
            "pack.sign_safe_operation signer={owner} safe_operation_hash={}",
            operation.hash()
        );
        operation.add_signature(signature);
        Ok(operation)
    }

    /// Submits the operation with its collected signatures. Does not wait for inclusion.
    ///
    /// # Errors
    /// - `PackError::ForeignOperation` if the operation targets another Safe, `EntryPoint` or chain.
    /// - `PackError::Submission` if the bundler rejects the operation.
    /// - `PackError::Operation` if an indexing-service record cannot be normalized.
    pub async fn execute_transaction(
        &self,
        operation: SafeOperationInput,
    ) -> Result<B256, PackError> {
        let operation = self.normalize(operation)?;
        if operation.signatures().is_empty() {
            crate::warn!(
                "pack.execute_transaction.unsigned safe_operation_hash={}",
                operation.hash()
            );
        }

        let user_operation = operation.user_operation();
        let user_op_hash = self
            .bundler
            .send_user_operation(&user_operation, self.entry_point)
            .await
            .map_err(PackError::Submission)?;

        let local_hash = operation.user_operation_hash();
        if local_hash == user_op_hash {
            crate::info!("pack.execute_transaction.submitted user_op_hash={user_op_hash}");
        } else {
            crate::warn!(
                "pack.execute_transaction.hash_mismatch bundler={user_op_hash} local={local_hash}"
            );
        }
        Ok(user_op_hash)
    }

    /// `eth_getUserOperationByHash`
    ///
    /// # Errors
    /// Returns `PackError::Rpc` on bundler failures.
    pub async fn get_user_operation_by_hash(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationByHash>, PackError> {
        Ok(self.bundler.get_user_operation_by_hash(user_op_hash).await?)
    }

    /// `eth_getUserOperationReceipt`
    ///
    /// # Errors
    /// Returns `PackError::Rpc` on bundler failures.
    pub async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, PackError> {
        Ok(self.bundler.get_user_operation_receipt(user_op_hash).await?)
    }

    /// `eth_supportedEntryPoints` of the bundler.
    ///
    /// # Errors
    /// Returns `PackError::Rpc` on bundler failures.
    pub async fn get_supported_entry_points(&self) -> Result<Vec<Address>, PackError> {
        Ok(self.bundler.supported_entry_points().await?)
    }

    /// `eth_chainId` of the bundler.
    ///
    /// # Errors
    /// Returns `PackError::Rpc` on bundler failures.
    pub async fn get_chain_id(&self) -> Result<u64, PackError> {
        Ok(self.bundler.chain_id().await?)
    }

    /// Exchange rate of `token` quoted by the configured paymaster.
    ///
    /// # Errors
    /// - `PackError::InvalidOptions` without a configured paymaster.
    /// - `PackError::Rpc` on paymaster failures, or if the paymaster does not quote `token`.
    pub async fn get_token_exchange_rate(&self, token: Address) -> Result<TokenQuote, PackError> {
        let Some(paymaster_options) = &self.paymaster_options else {
            return Err(PackError::InvalidOptions {
                message: "no paymaster configured".to_string(),
            });
        };
        let paymaster = PaymasterClient::new(paymaster_options.paymaster_url())?;
        paymaster
            .get_token_quotes(&[token], self.entry_point, self.chain_id)
            .await?
            .into_iter()
            .find(|quote| quote.token == token)
            .ok_or_else(|| {
                PackError::Rpc(RpcError::InvalidResponse {
                    error_message: format!("no quote for token {token}"),
                })
            })
    }

    /// The next nonce of the lane with `key`.
    ///
    /// # Errors
    /// Returns `PackError::Provider` on node failures.
    pub async fn get_nonce(&self, key: U192) -> Result<NonceLane, PackError> {
        let nonce = self
            .provider
            .get_nonce(self.entry_point, self.safe_address, key)
            .await?;
        Ok(NonceLane::decode(nonce))
    }

    /// Whether the Safe is deployed.
    ///
    /// # Errors
    /// Returns `PackError::Provider` on node failures.
    pub async fn is_deployed(&self) -> Result<bool, PackError> {
        Ok(self.provider.is_deployed(self.safe_address).await?)
    }

    /// Polls `eth_getUserOperationReceipt` every `interval` until the operation is included.
    ///
    /// There is no timeout; drop the future to stop waiting.
    ///
    /// # Errors
    /// Returns `PackError::Rpc` on bundler failures.
    pub async fn wait_for_receipt(
        &self,
        user_op_hash: B256,
        interval: Duration,
    ) -> Result<UserOperationStatus, PackError> {
        loop {
            if let Some(receipt) = self.bundler.get_user_operation_receipt(user_op_hash).await? {
                crate::info!(
                    "pack.receipt user_op_hash={user_op_hash} success={} tx={}",
                    receipt.success,
                    receipt.receipt.transaction_hash
                );
                return Ok(if receipt.success {
                    UserOperationStatus::Confirmed(receipt)
                } else {
                    UserOperationStatus::Failed(receipt)
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// The Safe, predicted for a counterfactual account.
    #[must_use]
    pub const fn get_safe_address(&self) -> Address {
        self.safe_address
    }

    /// The selected `EntryPoint`.
    #[must_use]
    pub const fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Chain of the provider, read at `init`.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Contracts in use.
    #[must_use]
    pub const fn contracts(&self) -> &Safe4337Contracts {
        &self.contracts
    }
}

impl Safe4337Pack {
    /// Resolves `operation` and checks it belongs to this pack's Safe, `EntryPoint` and chain.
    fn normalize(&self, operation: SafeOperationInput) -> Result<SafeOperation, PackError> {
        let operation = match operation {
            SafeOperationInput::Local(operation) => operation,
            SafeOperationInput::Indexed(response) => {
                SafeOperation::from_response(&response, self.chain_id)?
            }
        };

        let options = operation.options();
        let mismatch = if operation.sender() != self.safe_address {
            Some(format!("sender {} is not Safe {}", operation.sender(), self.safe_address))
        } else if options.entry_point != self.entry_point {
            Some(format!(
                "EntryPoint {} is not {}",
                options.entry_point, self.entry_point
            ))
        } else if options.chain_id != self.chain_id {
            Some(format!("chain {} is not {}", options.chain_id, self.chain_id))
        } else {
            None
        };
        match mismatch {
            Some(message) => Err(PackError::ForeignOperation { message }),
            None => Ok(operation),
        }
    }

    /// Runs pre-estimation, bundler estimation and post-estimation, adding the signature
    /// overhead of `threshold` owners to every `verificationGasLimit` a stage returns.
    async fn estimate(
        &self,
        operation: &mut SafeOperation,
        threshold: u64,
        paymaster_options: Option<PaymasterOptions>,
    ) -> Result<(), PackError> {
        let mut dummy = SignatureSet::default();
        dummy.add(
            self.signer
                .dummy_signature(self.contracts.webauthn_shared_signer),
        );
        let context = |operation: &SafeOperation| EstimationContext {
            user_operation: operation.user_operation_with_signatures(&dummy),
            entry_point: self.entry_point,
            chain_id: self.chain_id,
            paymaster_options: paymaster_options.clone(),
        };

        let pre = self.fee_estimator.pre_estimate(&context(operation)).await?;
        self.merge_stage(operation, pre, threshold)?;

        let estimated = self
            .bundler
            .estimate_user_operation_gas(&context(operation).user_operation, self.entry_point)
            .await
            .map_err(FeeEstimationError::from)?;
        crate::debug!(
            "pack.estimate.bundler call_gas_limit={:?} verification_gas_limit={:?} pre_verification_gas={:?}",
            estimated.call_gas_limit,
            estimated.verification_gas_limit,
            estimated.pre_verification_gas
        );
        self.merge_stage(operation, estimated, threshold)?;

        let post = self.fee_estimator.post_estimate(&context(operation)).await?;
        self.merge_stage(operation, post, threshold)?;
        Ok(())
    }

    fn merge_stage(
        &self,
        operation: &mut SafeOperation,
        mut data: EstimateGasData,
        threshold: u64,
    ) -> Result<(), OperationError> {
        if let Some(verification_gas_limit) = data.verification_gas_limit {
            let overhead = U256::from(threshold).saturating_mul(U256::from(
                self.per_owner_verification_overhead,
            ));
            data.verification_gas_limit = Some(verification_gas_limit.saturating_add(overhead));
        }
        operation.add_estimations(&data)
    }
}

async fn check_existing_safe(
    provider: &dyn SafeProvider,
    safe_address: Address,
    contracts: &Safe4337Contracts,
) -> Result<(), PackError> {
    if !provider.is_deployed(safe_address).await? {
        return Err(PackError::Compatibility {
            message: format!("Incompatibility detected: no Safe is deployed at {safe_address}"),
        });
    }

    let version = parse_version(&provider.version(safe_address).await?)?;
    let minimum = parse_version(MIN_SAFE_VERSION)?;
    if version < minimum {
        return Err(PackError::Compatibility {
            message: format!(
                "Incompatibility detected: Safe version {version} is not supported, the minimum is {minimum}"
            ),
        });
    }

    let module = contracts.safe_4337_module;
    if !provider.is_module_enabled(safe_address, module).await? {
        return Err(PackError::Compatibility {
            message: format!(
                "Incompatibility detected: The EIP-4337 module is not enabled in the provided Safe Account. Enable this module (address: {module}) to add compatibility."
            ),
        });
    }

    if provider.fallback_handler(safe_address).await? != module {
        return Err(PackError::Compatibility {
            message: format!(
                "Incompatibility detected: The EIP-4337 fallbackhandler is not attached to the Safe Account. Attach this fallbackhandler (address: {module}) to ensure compatibility."
            ),
        });
    }
    Ok(())
}

async fn prepare_new_safe(
    provider: &dyn SafeProvider,
    signer: &OwnerSigner,
    contracts: &Safe4337Contracts,
    options: &PredictedSafeOptions,
    paymaster_options: Option<&PaymasterOptions>,
) -> Result<SafeDeployment, PackError> {
    let version = parse_version(&options.safe_version)?;
    let minimum = parse_version(MIN_SAFE_VERSION)?;
    if version < minimum {
        return Err(PackError::Compatibility {
            message: format!(
                "Incompatibility detected: Safe version {version} is not supported, the minimum is {minimum}"
            ),
        });
    }

    let mut options = options.clone();
    let mut extras = deployment::SetupExtras {
        approval: paymaster_options.and_then(PaymasterOptions::approval),
        passkey: None,
    };
    if let OwnerSigner::Passkey(passkey) = signer {
        if !options.owners.contains(&contracts.webauthn_shared_signer) {
            options.owners.push(contracts.webauthn_shared_signer);
        }
        extras.passkey = Some(passkey::signer_configuration(passkey.as_ref()));
    }

    if options.owners.is_empty() {
        return Err(PackError::InvalidOptions {
            message: "a new Safe needs at least one owner".to_string(),
        });
    }
    let owner_count = u64::try_from(options.owners.len()).unwrap_or(u64::MAX);
    if options.threshold == 0 || options.threshold > owner_count {
        return Err(PackError::InvalidOptions {
            message: format!(
                "threshold {} is not within 1..={owner_count}",
                options.threshold
            ),
        });
    }

    let creation_code = provider.proxy_creation_code(contracts.proxy_factory).await?;
    Ok(deployment::prepare(contracts, &options, &extras, &creation_code))
}

/// Errors raised by [`Safe4337Pack`].
#[crate::safe4337_error]
pub enum PackError {
    /// The Safe, its modules or the bundler are incompatible with the configuration.
    #[error("{message}")]
    Compatibility {
        /// What is incompatible.
        message: String,
    },
    /// The active signer does not own the Safe.
    #[error("signer {signer} is not an owner of Safe {safe}")]
    NotAnOwner {
        /// The signer.
        signer: String,
        /// The Safe.
        safe: String,
    },
    /// The active key supports no typed-data signing method.
    #[error("signer {signer} does not support any typed data signing method")]
    SigningUnsupported {
        /// The signer.
        signer: String,
    },
    /// The operation was built for another Safe, `EntryPoint` or chain.
    #[error("operation does not belong to this account: {message}")]
    ForeignOperation {
        /// The mismatching field.
        message: String,
    },
    /// Malformed calls.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The bundler or paymaster rejected the estimation.
    #[error(transparent)]
    Estimation(#[from] FeeEstimationError),
    /// The bundler rejected the operation.
    #[error("user operation rejected: {0}")]
    Submission(RpcError),
    /// Missing deployment or unknown `EntryPoint`.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Invalid pack or transaction options.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// Details.
        message: String,
    },
    /// Node failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The operation could not be built or modified.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// Signer failure other than an unsupported key.
    #[error(transparent)]
    Signer(SignerError),
    /// Bundler or paymaster query failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, bytes};
    use async_trait::async_trait;

    use crate::signer::LocalKeySigner;

    const SAFE: Address = address!("0xf1390a26bd60d83a4e38c7be7be1003c616296ad");

    #[derive(Debug)]
    struct StubProvider {
        deployed: bool,
        version: &'static str,
        module_enabled: bool,
        fallback_handler: Address,
    }

    impl StubProvider {
        fn compatible() -> Self {
            Self {
                deployed: true,
                version: "1.4.1",
                module_enabled: true,
                fallback_handler: Safe4337Contracts::canonical_v0_3_0().safe_4337_module,
            }
        }
    }

    #[async_trait]
    impl SafeProvider for StubProvider {
        async fn chain_id(&self) -> Result<u64, ProviderError> {
            Ok(11_155_111)
        }
        async fn is_deployed(&self, _: Address) -> Result<bool, ProviderError> {
            Ok(self.deployed)
        }
        async fn owners(&self, _: Address) -> Result<Vec<Address>, ProviderError> {
            Ok(vec![])
        }
        async fn threshold(&self, _: Address) -> Result<u64, ProviderError> {
            Ok(1)
        }
        async fn version(&self, _: Address) -> Result<String, ProviderError> {
            Ok(self.version.to_string())
        }
        async fn is_module_enabled(&self, _: Address, _: Address) -> Result<bool, ProviderError> {
            Ok(self.module_enabled)
        }
        async fn fallback_handler(&self, _: Address) -> Result<Address, ProviderError> {
            Ok(self.fallback_handler)
        }
        async fn get_nonce(&self, _: Address, _: Address, _: U192) -> Result<U256, ProviderError> {
            Ok(U256::ZERO)
        }
        async fn proxy_creation_code(&self, _: Address) -> Result<Bytes, ProviderError> {
            Ok(bytes!("608060405234801561001057600080fd5b50"))
        }
        async fn gas_price(&self) -> Result<U256, ProviderError> {
            Ok(U256::from(1_000_000_000u64))
        }
        async fn max_priority_fee_per_gas(&self) -> Result<U256, ProviderError> {
            Ok(U256::from(100_000_000u64))
        }
    }

    fn contracts() -> Safe4337Contracts {
        Safe4337Contracts::canonical_v0_3_0()
    }

    #[tokio::test]
    async fn test_existing_safe_passes_checks() {
        check_existing_safe(&StubProvider::compatible(), SAFE, &contracts())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_existing_safe_without_module_is_rejected() {
        let provider = StubProvider {
            module_enabled: false,
            ..StubProvider::compatible()
        };
        let err = check_existing_safe(&provider, SAFE, &contracts())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, PackError::Compatibility { message } if message.contains("module is not enabled"))
        );
    }

    #[tokio::test]
    async fn test_existing_safe_with_foreign_fallback_handler_is_rejected() {
        let provider = StubProvider {
            fallback_handler: address!("0xfd0732Dc9E303f09fCEf3a7388Ad10A83459Ec99"),
            ..StubProvider::compatible()
        };
        let err = check_existing_safe(&provider, SAFE, &contracts())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, PackError::Compatibility { message } if message.contains("fallbackhandler"))
        );
    }

    #[tokio::test]
    async fn test_old_safe_version_is_rejected() {
        let provider = StubProvider {
            version: "1.3.0",
            ..StubProvider::compatible()
        };
        let err = check_existing_safe(&provider, SAFE, &contracts())
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::Compatibility { .. }));
    }

    #[tokio::test]
    async fn test_undeployed_existing_safe_is_rejected() {
        let provider = StubProvider {
            deployed: false,
            ..StubProvider::compatible()
        };
        assert!(check_existing_safe(&provider, SAFE, &contracts()).await.is_err());
    }

    #[tokio::test]
    async fn test_new_safe_threshold_must_fit_owners() {
        let signer = OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(
            alloy::signers::local::PrivateKeySigner::random(),
        )));
        let options = PredictedSafeOptions::new(
            vec![address!("0x1111111111111111111111111111111111111111")],
            2,
        );
        let err = prepare_new_safe(
            &StubProvider::compatible(),
            &signer,
            &contracts(),
            &options,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PackError::InvalidOptions { .. }));
    }

    #[tokio::test]
    async fn test_new_safe_deployment_is_deterministic() {
        let signer = OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(
            alloy::signers::local::PrivateKeySigner::random(),
        )));
        let options = PredictedSafeOptions::new(
            vec![address!("0x1111111111111111111111111111111111111111")],
            1,
        );
        let provider = StubProvider::compatible();
        let first = prepare_new_safe(&provider, &signer, &contracts(), &options, None)
            .await
            .unwrap();
        let second = prepare_new_safe(&provider, &signer, &contracts(), &options, None)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.factory, contracts().proxy_factory);
        assert_eq!(first.threshold, 1);
    }
}
