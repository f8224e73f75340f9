use std::sync::Arc;

mod common;
use alloy::{
    primitives::{address, b256, bytes, Address, B256, U256},
    signers::local::PrivateKeySigner,
};
use common::{
    bundler_and_paymaster, legacy_bundler, MockSafeProvider, BUNDLER_CALL_GAS,
    BUNDLER_VERIFICATION_GAS, SUBMITTED_HASH,
};

use safe4337::{
    operation::{SafeOperation, SafeOperationOptions, UserOperation, UserOperationDraft},
    pack::{
        OnchainAnalytics, PackError, Safe4337Config, Safe4337Pack, SafeAccountOptions,
        TransactionOptions,
    },
    primitives::config::{Safe4337Contracts, ENTRY_POINT_V07},
    signer::{LocalKeySigner, OwnerSigner, SigningMethod},
    transaction::{decode_calls, MetaTransaction},
};

const SAFE: Address = address!("0xf1390a26bd60d83a4e38c7be7be1003c616296ad");
const PAYMASTER: Address = address!("0x0000000000000039cd5e8aE05257CE51C473ddd1");

fn transfer() -> MetaTransaction {
    MetaTransaction::call(
        address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
        U256::from(1_000),
        bytes!(""),
    )
}

async fn pack_for(
    provider: MockSafeProvider,
    key: PrivateKeySigner,
    bundler_url: &str,
) -> Result<Safe4337Pack, PackError> {
    let config = Safe4337Config::new(
        Arc::new(provider),
        OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(key))),
        bundler_url,
        SafeAccountOptions::Existing { safe_address: SAFE },
    );
    Safe4337Pack::init(config).await
}

#[tokio::test]
async fn test_init_selects_the_v07_entry_point() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let provider = MockSafeProvider::deployed(vec![key.address()], 1);

    let pack = pack_for(provider, key, &server.url).await.unwrap();

    assert_eq!(pack.entry_point(), ENTRY_POINT_V07);
    assert_eq!(pack.get_safe_address(), SAFE);
    assert_eq!(pack.chain_id(), common::CHAIN_ID);
    assert_eq!(server.count("eth_supportedEntryPoints"), 1);
}

#[tokio::test]
async fn test_init_fails_when_bundler_serves_no_compatible_entry_point() {
    let key = PrivateKeySigner::random();
    let server = legacy_bundler();
    let provider = MockSafeProvider::deployed(vec![key.address()], 1);

    let err = pack_for(provider, key, &server.url).await.unwrap_err();

    match err {
        PackError::Compatibility { message } => {
            assert!(message.starts_with("Incompatibility detected"));
            assert!(message.contains("0.3.0"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_create_transaction_estimates_with_signature_overhead() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let owners = vec![
        key.address(),
        address!("0x1111111111111111111111111111111111111111"),
        address!("0x2222222222222222222222222222222222222222"),
    ];
    let pack = pack_for(MockSafeProvider::deployed(owners, 2), key, &server.url)
        .await
        .unwrap();

    let operation = pack
        .create_transaction(vec![transfer()], TransactionOptions::default())
        .await
        .unwrap();

    // two required signatures on top of the single dummy signature the bundler measured
    assert_eq!(
        operation.verification_gas_limit(),
        U256::from(BUNDLER_VERIFICATION_GAS + 2 * 10_000)
    );
    let UserOperation::V07(user_operation) = operation.unsigned_user_operation() else {
        panic!("expected a v0.7 operation");
    };
    assert_eq!(user_operation.call_gas_limit, U256::from(BUNDLER_CALL_GAS));
    assert_eq!(user_operation.max_fee_per_gas, U256::from(3_000_000_000u64));
    assert_eq!(
        user_operation.max_priority_fee_per_gas,
        U256::from(1_500_000_000u64)
    );
    assert_eq!(user_operation.nonce, U256::from(3));
    assert!(user_operation.factory.is_none());
    assert!(user_operation.paymaster.is_none());

    let calls = decode_calls(operation.call_data()).unwrap();
    assert_eq!(calls, vec![transfer()]);

    // the bundler measured a 65 byte dummy signature behind the validity window
    let estimated = &server.params_of("eth_estimateUserOperationGas")[0];
    let signature = estimated[0]["signature"].as_str().unwrap();
    assert_eq!(signature.len(), 2 + 2 * (12 + 65));
    assert_eq!(estimated[1], serde_json::json!(ENTRY_POINT_V07));
}

#[tokio::test]
async fn test_batches_go_through_multi_send() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(
        MockSafeProvider::deployed(vec![key.address()], 1),
        key,
        &server.url,
    )
    .await
    .unwrap();

    let second = MetaTransaction::call(
        address!("0x6B175474E89094C44Da98b954EedeAC495271d0F"),
        U256::ZERO,
        bytes!("a9059cbb"),
    );
    let operation = pack
        .create_transaction(vec![transfer(), second.clone()], TransactionOptions::default())
        .await
        .unwrap();

    assert_eq!(decode_calls(operation.call_data()).unwrap(), vec![transfer(), second]);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(
        MockSafeProvider::deployed(vec![key.address()], 1),
        key,
        &server.url,
    )
    .await
    .unwrap();

    let err = pack
        .create_transaction(vec![], TransactionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PackError::Encoding(_)));
    assert_eq!(server.count("eth_estimateUserOperationGas"), 0);
}

#[tokio::test]
async fn test_sign_and_execute() {
    let key = PrivateKeySigner::random();
    let owner = key.address();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(MockSafeProvider::deployed(vec![owner], 1), key, &server.url)
        .await
        .unwrap();

    let operation = pack
        .create_transaction(vec![transfer()], TransactionOptions::default())
        .await
        .unwrap();
    let signed = pack
        .sign_safe_operation(operation.into(), SigningMethod::EthSignTypedDataV4)
        .await
        .unwrap();
    assert!(signed.get_signature(&owner).is_some());

    let user_op_hash = pack.execute_transaction(signed.clone().into()).await.unwrap();
    assert_eq!(user_op_hash, SUBMITTED_HASH.parse::<B256>().unwrap());

    let sent = &server.params_of("eth_sendUserOperation")[0];
    let signature = sent[0]["signature"].as_str().unwrap();
    assert_eq!(
        signature,
        format!("0x{}{}", "0".repeat(24), hex::encode(signed.encoded_signatures()))
    );
}

#[tokio::test]
async fn test_non_owner_cannot_sign() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(
        MockSafeProvider::deployed(
            vec![address!("0x1111111111111111111111111111111111111111")],
            1,
        ),
        key,
        &server.url,
    )
    .await
    .unwrap();

    let operation = pack
        .create_transaction(vec![transfer()], TransactionOptions::default())
        .await
        .unwrap();
    let err = pack
        .sign_safe_operation(operation.into(), SigningMethod::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PackError::NotAnOwner { .. }));
}

#[tokio::test]
async fn test_analytics_identifier_trails_call_data() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let analytics = OnchainAnalytics {
        project: "Test Project".to_string(),
        platform: None,
    };
    let mut config = Safe4337Config::new(
        Arc::new(MockSafeProvider::deployed(vec![key.address()], 1)),
        OwnerSigner::TypedData(Arc::new(LocalKeySigner::new(key))),
        &server.url,
        SafeAccountOptions::Existing { safe_address: SAFE },
    );
    config.onchain_analytics = Some(analytics.clone());
    let pack = Safe4337Pack::init(config).await.unwrap();

    let operation = pack
        .create_transaction(vec![transfer()], TransactionOptions::default())
        .await
        .unwrap();

    assert!(operation.call_data().ends_with(&analytics.identifier()));
    assert_eq!(decode_calls(operation.call_data()).unwrap(), vec![transfer()]);
}

#[tokio::test]
async fn test_pending_operation_has_no_receipt() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(
        MockSafeProvider::deployed(vec![key.address()], 1),
        key,
        &server.url,
    )
    .await
    .unwrap();

    let hash = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
    assert!(pack.get_user_operation_receipt(hash).await.unwrap().is_none());
    assert!(pack.get_user_operation_by_hash(hash).await.unwrap().is_none());
    assert_eq!(pack.get_chain_id().await.unwrap(), common::CHAIN_ID);
    assert_eq!(
        pack.get_supported_entry_points().await.unwrap(),
        vec![ENTRY_POINT_V07]
    );
}

fn operation_for(sender: Address, chain_id: u64) -> SafeOperation {
    SafeOperation::new(
        UserOperationDraft::new(sender, U256::from(3), bytes!("7bb37428")),
        SafeOperationOptions {
            chain_id,
            module_address: Safe4337Contracts::canonical_v0_3_0().safe_4337_module,
            entry_point: ENTRY_POINT_V07,
            valid_after: 0,
            valid_until: 0,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_operations_of_other_accounts_are_refused() {
    let key = PrivateKeySigner::random();
    let server = bundler_and_paymaster(PAYMASTER);
    let pack = pack_for(
        MockSafeProvider::deployed(vec![key.address()], 1),
        key,
        &server.url,
    )
    .await
    .unwrap();

    let other_safe = operation_for(address!("0x3333333333333333333333333333333333333333"), common::CHAIN_ID);
    let err = pack
        .sign_safe_operation(other_safe.clone().into(), SigningMethod::default())
        .await
        .unwrap_err();
    assert!(
        matches!(&err, PackError::ForeignOperation { message } if message.contains("sender"))
    );

    let err = pack.execute_transaction(other_safe.into()).await.unwrap_err();
    assert!(matches!(err, PackError::ForeignOperation { .. }));
    assert_eq!(server.count("eth_sendUserOperation"), 0);

    let other_chain = operation_for(SAFE, 1);
    let err = pack.execute_transaction(other_chain.into()).await.unwrap_err();
    assert!(matches!(&err, PackError::ForeignOperation { message } if message.contains("chain")));

    let own = operation_for(SAFE, common::CHAIN_ID);
    assert!(pack
        .sign_safe_operation(own.into(), SigningMethod::default())
        .await
        .is_ok());
}
