//! Event signature hashes for log filtering.
//!
//! The watchers match raw logs against these topic-0 hashes, which must be
//! byte-identical to what the Solidity bridge contracts emit.

use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Topic-0 for the source bridge's escrow deposit event:
/// `Locked(address indexed user, uint256 amount, address destination)`
pub fn locked_event_signature() -> [u8; 32] {
    keccak256(b"Locked(address,uint256,address)")
}

/// Topic-0 for the destination bridge's burn event:
/// `Burned(address indexed user, uint256 amount, address destination)`
pub fn burned_event_signature() -> [u8; 32] {
    keccak256(b"Burned(address,uint256,address)")
}
