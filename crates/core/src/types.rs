use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// 32-byte hash (Merkle roots and nodes)
pub type Hash = [u8; 32];

/// 32-byte ed25519 public key
pub type PublicKey = [u8; 32];

/// Decode a hex string into exactly `N` bytes.
///
/// Accepts either case and an optional `0x` prefix.
fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], CoreError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| CoreError::InvalidHex(format!("{s:?}: {e}")))?;
    if bytes.len() != N {
        return Err(CoreError::InvalidLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Length of the binary form in bytes
            pub const LEN: usize = 32;

            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse from hex (either case, optional `0x` prefix).
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                decode_fixed::<32>(s).map(Self)
            }

            /// Canonical string form: 64 lowercase hex characters.
            pub fn to_canonical(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_canonical())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_canonical()[..16])
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_canonical())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// Node identifier for gateways, providers and clients.
    ///
    /// The stored bytes are the decoded canonical form, so equality and
    /// hashing over a `NodeId` are equality over its canonical lowercase-hex
    /// string. `"ABCD…"` and `"abcd…"` parse to the same id.
    NodeId
);

hex_identifier!(
    /// Identifier of a piece of content.
    ContentId
);

/// Merkle inclusion proof: sibling hashes from leaf level up to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf (determines left/right at each level)
    pub leaf_index: usize,
    /// Sibling hashes, bottom-up
    #[serde(with = "hex32_vec")]
    pub siblings: Vec<Hash>,
}

/// Serde adapter for a single 32-byte value as a hex string.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_fixed::<32>(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for a list of 32-byte values as hex strings.
pub mod hex32_vec {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(items: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| super::decode_fixed::<32>(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOWER: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn test_node_id_canonical_roundtrip() {
        let id = NodeId::parse(LOWER).unwrap();
        assert_eq!(id.to_canonical(), LOWER);
        assert_eq!(id.to_string(), LOWER);
    }

    #[test]
    fn test_node_id_case_insensitive() {
        let upper = LOWER.to_uppercase();
        let a = NodeId::parse(LOWER).unwrap();
        let b = NodeId::parse(&upper).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.to_canonical(), LOWER);
    }

    #[test]
    fn test_node_id_accepts_0x_prefix() {
        let id = NodeId::parse(&format!("0x{LOWER}")).unwrap();
        assert_eq!(id.to_canonical(), LOWER);
    }

    #[test]
    fn test_node_id_wrong_length() {
        let err = NodeId::parse("abcd").unwrap_err();
        assert_eq!(err, CoreError::InvalidLength { expected: 32, got: 2 });
    }

    #[test]
    fn test_node_id_invalid_hex() {
        assert!(matches!(NodeId::parse("zz"), Err(CoreError::InvalidHex(_))));
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let id = NodeId::from_bytes([0xAB; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));

        let parsed: NodeId = serde_json::from_str(&json.to_uppercase()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_content_id_debug_is_short() {
        let cid = ContentId::from_bytes([1u8; 32]);
        assert_eq!(format!("{cid:?}"), "ContentId(0101010101010101)");
    }

    #[test]
    fn test_merkle_proof_hex_siblings() {
        let proof = MerkleProof {
            leaf_index: 3,
            siblings: vec![[0u8; 32], [0xFF; 32]],
        };
        let value = serde_json::to_value(&proof).unwrap();
        assert_eq!(value["siblings"][1], "ff".repeat(32));

        let back: MerkleProof = serde_json::from_value(value).unwrap();
        assert_eq!(back, proof);
    }
}
