//! Source-chain bridge contract ABI definition
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the escrow
//! contract on the source chain.

use alloy::sol;

sol! {
    /// Escrow contract holding the original asset
    #[sol(rpc)]
    contract SourceBridge {
        /// Return escrowed tokens to a recipient.
        /// Callable only by the configured relayer key; any other caller
        /// fails with an authorization error.
        function release(address user, uint256 amount) external;

        /// Emitted when a user deposits tokens into escrow.
        /// `destination` is the account the representation should be
        /// minted to on the destination chain.
        event Locked(
            address indexed user,
            uint256 amount,
            address destination
        );
    }
}
