//! Key-derived node identity
//!
//! Everything a node is known by in the overlay is computed from its secret key:
//! - the network ID, shared by every node that holds the same key
//! - the address block, an RFC 4193 unique-local /48 derived from the public key
//!
//! Derivation is pure. Nodes that start independently with the same key agree on
//! both values without exchanging a single packet.

use crate::{Error, Result};
use ed25519_dalek::SigningKey;
use ipnetwork::Ipv6Network;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

/// Length of the secret key seed in bytes
pub const SECRET_KEY_LEN: usize = 32;

/// Prefix length of every node address block
pub const ADDRESS_BLOCK_PREFIX: u8 = 48;

/// Locally assigned unique-local prefix (fd00::/8)
const ULA_PREFIX: u8 = 0xfd;

/// Bytes of the public key digest used as the ULA global ID (40 bits)
const GLOBAL_ID_LEN: usize = 5;

const NETWORK_ID_TAG: &[u8] = b"meshnode/network-id/v1";

/// Operator-supplied secret key (Ed25519 seed)
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Decode a secret key from its hex form.
    ///
    /// Surrounding whitespace is ignored; anything other than exactly
    /// 32 hex-encoded bytes is rejected.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidKey("secret key is empty".to_string()));
        }
        let bytes = hex::decode(s)?;
        let seed: [u8; SECRET_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Encode the secret key in the form accepted by [`SecretKey::from_hex`]
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Public half of the key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Network ID scoped by this key
    pub fn network_id(&self) -> NetworkId {
        let mut hasher = Sha256::new();
        hasher.update(NETWORK_ID_TAG);
        hasher.update(self.signing_key.to_bytes());
        NetworkId(hasher.finalize().into())
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Node public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "hex_bytes")] [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Address block owned by this key
    pub fn address_block(&self) -> Result<AddressBlock> {
        let digest = Sha256::digest(self.0);
        let mut octets = [0u8; 16];
        octets[0] = ULA_PREFIX;
        octets[1..=GLOBAL_ID_LEN].copy_from_slice(&digest[..GLOBAL_ID_LEN]);
        let network = Ipv6Network::new(Ipv6Addr::from(octets), ADDRESS_BLOCK_PREFIX)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(AddressBlock(network))
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// Identifier shared by all nodes holding the same secret key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(#[serde(with = "hex_bytes")] [u8; 32]);

impl NetworkId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", self)
    }
}

/// Contiguous range of overlay addresses assigned to a key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressBlock(Ipv6Network);

impl AddressBlock {
    pub fn network(&self) -> Ipv6Network {
        self.0
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Check whether an address falls inside the block
    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V6(v6) => self.0.contains(v6),
            IpAddr::V4(_) => false,
        }
    }

    /// Check whether two blocks share any address
    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        self.0.contains(other.0.network()) || other.0.contains(self.0.network())
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressBlock({})", self.0)
    }
}

impl From<AddressBlock> for String {
    fn from(block: AddressBlock) -> Self {
        block.to_string()
    }
}

impl TryFrom<String> for AddressBlock {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse::<Ipv6Network>()
            .map(AddressBlock)
            .map_err(|e| e.to_string())
    }
}

/// Everything derived from a secret key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub network_id: NetworkId,
    pub address_block: AddressBlock,
    pub public_key: PublicKey,
}

impl Identity {
    pub fn from_secret_key(key: &SecretKey) -> Result<Self> {
        let public_key = key.public_key();
        Ok(Self {
            network_id: key.network_id(),
            address_block: public_key.address_block()?,
            public_key,
        })
    }
}

/// Derive the address block and network ID from a hex-encoded secret key
pub fn derive(secret_key: &str) -> Result<Identity> {
    let key = SecretKey::from_hex(secret_key)?;
    Identity::from_secret_key(&key)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(
        deserializer: D,
    ) -> std::result::Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(len, &"a 32-byte hex string"))
    }
}
