//! Counterfactual Safe deployment.
//!
//! A Safe that does not exist yet is deployed by its first user operation: the `initCode`
//! calls `createProxyWithNonce` on the proxy factory, and the Safe's `setup` delegate-calls a
//! batch enabling the 4337 module (plus, optionally, a paymaster allowance and a passkey
//! registration). The address is known ahead of time through CREATE2.

use alloy::{
    primitives::{keccak256, Address, Bytes, U256},
    sol_types::SolCall,
};

use super::config::{DeploymentType, PredictedSafeOptions};
use crate::{
    primitives::config::Safe4337Contracts,
    transaction::{
        contracts::{IErc20, ISafe, ISafeModuleSetup, ISafeProxyFactory, ISafeWebAuthnSharedSigner, WebAuthnSignerConfiguration},
        multisend, MetaTransaction,
    },
};

/// Deployment data of a counterfactual Safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeDeployment {
    /// The predicted Safe address.
    pub safe_address: Address,
    /// Proxy factory, the v0.7 `factory`.
    pub factory: Address,
    /// `createProxyWithNonce` calldata, the v0.7 `factoryData`.
    pub factory_data: Bytes,
    /// Owners the Safe is set up with.
    pub owners: Vec<Address>,
    /// Signatures required.
    pub threshold: u64,
}

/// What the Safe's `setup` runs besides storing owners.
#[derive(Debug, Clone, Default)]
pub struct SetupExtras {
    /// `(token, spender, amount)` allowance for an ERC-20 paymaster.
    pub approval: Option<(Address, Address, U256)>,
    /// Passkey to register with the shared WebAuthn signer.
    pub passkey: Option<WebAuthnSignerConfiguration>,
}

/// The calls `setup` delegate-calls: enable the module, then the optional extras.
#[must_use]
pub fn setup_calls(contracts: &Safe4337Contracts, extras: &SetupExtras) -> Vec<MetaTransaction> {
    let mut calls = vec![MetaTransaction::delegate_call(
        contracts.safe_module_setup,
        ISafeModuleSetup::enableModulesCall {
            modules: vec![contracts.safe_4337_module],
        }
        .abi_encode()
        .into(),
    )];

    if let Some((token, spender, amount)) = extras.approval {
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

    if let Some(signer) = &extras.passkey {
        calls.push(MetaTransaction::delegate_call(
            contracts.webauthn_shared_signer,
            ISafeWebAuthnSharedSigner::configureCall {
                signer: signer.clone(),
            }
            .abi_encode()
            .into(),
        ));
    }

    calls
}

/// `Safe.setup` calldata with the 4337 module as fallback handler.
#[must_use]
pub fn initializer(
    contracts: &Safe4337Contracts,
    owners: &[Address],
    threshold: u64,
    extras: &SetupExtras,
) -> Bytes {
    let calls = setup_calls(contracts, extras);
    // setup delegate-calls `to`, so one call goes there directly
    let (to, data) = match calls.as_slice() {
        [single] => (single.to, single.data.clone()),
        batch => (contracts.multi_send, multisend::encode_multi_send(batch)),
    };

    ISafe::setupCall {
        _owners: owners.to_vec(),
        _threshold: U256::from(threshold),
        to,
        data,
        fallbackHandler: contracts.safe_4337_module,
        paymentToken: Address::ZERO,
        payment: U256::ZERO,
        paymentReceiver: Address::ZERO,
    }
    .abi_encode()
    .into()
}

/// The singleton a new Safe proxies to.
#[must_use]
pub const fn singleton(contracts: &Safe4337Contracts, deployment_type: DeploymentType) -> Address {
    match deployment_type {
        DeploymentType::Canonical => contracts.safe_singleton,
        DeploymentType::L2 => contracts.safe_l2_singleton,
    }
}

/// Prepares the deployment of a Safe with `options`.
///
/// `proxy_creation_code` is the factory's `proxyCreationCode()`.
#[must_use]
pub fn prepare(
    contracts: &Safe4337Contracts,
    options: &PredictedSafeOptions,
    extras: &SetupExtras,
    proxy_creation_code: &[u8],
) -> SafeDeployment {
    let initializer = initializer(contracts, &options.owners, options.threshold, extras);
    let singleton = singleton(contracts, options.deployment_type);

    let safe_address = predict_address(
        contracts.proxy_factory,
        singleton,
        &initializer,
        options.salt_nonce,
        proxy_creation_code,
    );

    let factory_data = ISafeProxyFactory::createProxyWithNonceCall {
        _singleton: singleton,
        initializer,
        saltNonce: options.salt_nonce,
    }
    .abi_encode()
    .into();

    SafeDeployment {
        safe_address,
        factory: contracts.proxy_factory,
        factory_data,
        owners: options.owners.clone(),
        threshold: options.threshold,
    }
}

/// CREATE2 address of the proxy `createProxyWithNonce` deploys.
///
/// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/proxies/SafeProxyFactory.sol#L20>
#[must_use]
pub fn predict_address(
    factory: Address,
    singleton: Address,
    initializer: &[u8],
    salt_nonce: U256,
    proxy_creation_code: &[u8],
) -> Address {
    let mut salt_preimage = Vec::with_capacity(64);
    salt_preimage.extend_from_slice(keccak256(initializer).as_slice());
    salt_preimage.extend_from_slice(&salt_nonce.to_be_bytes::<32>());
    let salt = keccak256(salt_preimage);

    let mut deployment_code = proxy_creation_code.to_vec();
    deployment_code.extend_from_slice(&U256::from_be_slice(singleton.as_slice()).to_be_bytes::<32>());

    factory.create2(salt, keccak256(deployment_code))
}
