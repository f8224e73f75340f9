#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

//! `safe4337` builds, estimates, signs and submits ERC-4337 user operations for
//! multi-owner [Safe](https://safe.global/) smart accounts running the Safe 4337 module.
//!
//! Start from [`pack::Safe4337Pack::init`].
//!
//! Reference: <https://github.com/safe-global/safe-modules/tree/main/modules/4337>

pub use safe4337_macros::{safe4337_error, safe4337_export};

/// Introduces low level primitives: logging, errors and network configuration.
pub mod primitives;

/// Encodes Safe calls into 4337 module `executeUserOp` calldata.
pub mod transaction;

/// The Safe operation model and its `EntryPoint` v0.6 / v0.7 renditions.
pub mod operation;

/// JSON-RPC clients for bundlers, paymasters and nodes.
pub mod rpc;

/// Gas price and paymaster estimation.
pub mod fee_estimator;

/// Owner signatures.
pub mod signer;

/// The end-to-end pipeline.
pub mod pack;

uniffi::setup_scaffolding!("safe4337");
