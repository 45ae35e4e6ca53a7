//! Destination-chain bridge contract ABI definition
//!
//! Bindings for the contract managing the 1:1 representation token.

use alloy::sol;

sol! {
    /// Representation-token contract on the destination chain
    #[sol(rpc)]
    contract DestBridge {
        /// Issue representation tokens to a recipient.
        /// Callable only by the configured relayer key.
        function mint(address user, uint256 amount) external;

        /// Emitted when a holder destroys representation tokens.
        /// `destination` is the account the escrowed originals should be
        /// released to on the source chain.
        event Burned(
            address indexed user,
            uint256 amount,
            address destination
        );
    }
}
