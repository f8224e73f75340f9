//! Solidity interfaces of the contracts the pipeline encodes calls for or reads from.

use alloy::sol;

sol! {
    /// The Safe singleton (v1.4.1).
    ///
    /// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/Safe.sol>
    interface ISafe {
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;
        function getOwners() external view returns (address[] memory);
        function getThreshold() external view returns (uint256);
        function isModuleEnabled(address module) external view returns (bool);
        function getStorageAt(uint256 offset, uint256 length) external view returns (bytes memory);
        function VERSION() external view returns (string memory);
    }

    /// Reference: <https://github.com/safe-global/safe-modules/blob/main/modules/4337/contracts/Safe4337Module.sol>
    interface ISafe4337Module {
        function executeUserOp(address to, uint256 value, bytes calldata data, uint8 operation) external;
        function executeUserOpWithErrorString(address to, uint256 value, bytes calldata data, uint8 operation) external;
    }

    /// Reference: <https://github.com/safe-global/safe-modules/blob/main/modules/4337/contracts/SafeModuleSetup.sol>
    interface ISafeModuleSetup {
        function enableModules(address[] calldata modules) external;
    }

    /// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/proxies/SafeProxyFactory.sol>
    interface ISafeProxyFactory {
        function createProxyWithNonce(address _singleton, bytes memory initializer, uint256 saltNonce) external returns (address proxy);
        function proxyCreationCode() external pure returns (bytes memory);
    }

    /// Reference: <https://github.com/eth-infinitism/account-abstraction/blob/v0.7.0/contracts/interfaces/INonceManager.sol>
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    /// Reference: <https://github.com/safe-global/safe-smart-account/blob/v1.4.1/contracts/libraries/MultiSend.sol>
    interface IMultiSend {
        function multiSend(bytes memory transactions) external payable;
    }

    /// Reference: <https://eips.ethereum.org/EIPS/eip-20>
    interface IErc20 {
        function transfer(address to, uint256 value) external returns (bool);
        function approve(address spender, uint256 value) external returns (bool);
    }

    /// Public key and verifier configuration of a passkey owner.
    #[derive(Debug, PartialEq, Eq)]
    struct WebAuthnSignerConfiguration {
        uint256 x;
        uint256 y;
        uint176 verifiers;
    }

    /// Reference: <https://github.com/safe-global/safe-modules/blob/main/modules/passkey/contracts/4337/SafeWebAuthnSharedSigner.sol>
    interface ISafeWebAuthnSharedSigner {
        function configure(WebAuthnSignerConfiguration calldata signer) external;
    }
}

/// Storage slot holding the fallback handler of a Safe.
///
/// `keccak256("fallback_manager.handler.address")`
pub const FALLBACK_HANDLER_STORAGE_SLOT: alloy::primitives::B256 = alloy::primitives::b256!(
    "0x6c9a6c4a39284e37ed1cf53d337577d14212a4870fb976a4366c693b939918d5"
);
