//! Derived node state

use crate::identity::{AddressBlock, Identity, NetworkId, PublicKey};
use serde::{Deserialize, Serialize};

/// Read-mostly record derived from the node's key at construction.
///
/// The node never mutates its own copy. Services that need to augment it
/// (the net table, for example) keep a private clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub address_block: AddressBlock,
    pub network_id: NetworkId,
    pub public_key: PublicKey,
}

impl State {
    pub fn new(address_block: AddressBlock, network_id: NetworkId, public_key: PublicKey) -> Self {
        Self {
            address_block,
            network_id,
            public_key,
        }
    }
}

impl From<Identity> for State {
    fn from(identity: Identity) -> Self {
        Self::new(
            identity.address_block,
            identity.network_id,
            identity.public_key,
        )
    }
}
