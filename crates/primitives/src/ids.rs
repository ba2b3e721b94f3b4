//! Content-addressed identifiers shared by every stage of the pipeline.
//!
//! Every identifier in this crate is a 32-byte digest rendered as lowercase
//! hex wherever it crosses a boundary (store rows, wire payloads, logs).
//! The digest itself is produced by `wayline-identity`; this module only
//! owns the opaque, comparable, serialisable wrapper types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raw 32-byte digest backing every identifier in this crate.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

/// A hex string did not decode into a 32-byte digest.
#[derive(Debug, thiserror::Error)]
#[error("invalid digest: {0}")]
pub struct InvalidDigest(String);

impl Digest {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hashes the fixed ASCII serialisation used to derive visit/tree ids.
    #[must_use]
    pub fn of(input: &str) -> Self {
        use sha2::{Digest as _, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidDigest(s.to_owned()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidDigest(s.to_owned()))?;
        Ok(Self(array))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declares a newtype identifier backed by [`Digest`], with the string
/// conversions the store and wire formats both rely on.
macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Digest);

        impl $name {
            #[must_use]
            pub const fn from_digest(digest: Digest) -> Self {
                Self(digest)
            }

            #[must_use]
            pub const fn digest(&self) -> &Digest {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = InvalidDigest;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

digest_id!(
    /// Identifies a single page visit. Deterministic over `(url, page_loaded_at)`.
    VisitId
);

digest_id!(
    /// Identifies a navigation tree. Equal to the `VisitId` of its root visit.
    TreeId
);

impl TreeId {
    /// A tree's id is, by convention, its root visit's id.
    #[must_use]
    pub const fn from_root_visit(root: VisitId) -> Self {
        Self(root.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips_through_hex() {
        let digest = Digest::from_bytes([7; 32]);
        let hex = digest.to_hex();
        let parsed: Digest = hex.parse().unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("not-hex".parse::<Digest>().is_err());
        assert!("ab".parse::<Digest>().is_err());
    }

    #[test]
    fn tree_id_equals_root_visit_id() {
        let digest = Digest::from_bytes([1; 32]);
        let visit = VisitId::from_digest(digest);
        let tree = TreeId::from_root_visit(visit);
        assert_eq!(tree.to_string(), visit.to_string());
    }
}
