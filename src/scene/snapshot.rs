use sha2::Digest as _;

use crate::foundation::error::FrameloomResult;

/// Number of hex characters kept from the SHA-256 digest for content hashes.
///
/// The prefix length must never change once entries exist on disk: cache keys
/// embed these hashes and are required to stay addressable across releases.
pub(crate) const CONTENT_HASH_LEN: usize = 16;

/// Capability contract for scenes that can enter the caching and export paths.
///
/// A scene exposes a full-fidelity string snapshot plus a stable type tag. The
/// content hash is deliberately *not* part of the contract: it is derived from
/// the serialized data by [`content_hash`], so two implementations cannot
/// disagree about what identical content hashes to.
pub trait Serializable {
    /// Produce a full-fidelity string snapshot of the scene's current state.
    fn serialize(&self) -> FrameloomResult<String>;

    /// Stable identifier for the scene type (e.g. `"composition"`).
    fn type_id(&self) -> &str;
}

/// Content-addressed snapshot of a scene's state.
///
/// `hash` is a pure function of `data`: equal data always yields an equal
/// hash, across calls and process restarts. A changed hash invalidates every
/// frame previously cached under the old one.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SceneSnapshot {
    /// Serialized scene state.
    pub data: String,
    /// Truncated SHA-256 of `data` (lowercase hex).
    pub hash: String,
    /// Scene type tag, as reported by [`Serializable::type_id`].
    pub type_id: String,
}

impl SceneSnapshot {
    /// Capture a snapshot from any [`Serializable`] scene.
    pub fn capture(scene: &dyn Serializable) -> FrameloomResult<Self> {
        let data = scene.serialize()?;
        let hash = content_hash(&data);
        Ok(Self {
            data,
            hash,
            type_id: scene.type_id().to_owned(),
        })
    }

    /// Build a snapshot directly from already-serialized data.
    pub fn from_data(data: impl Into<String>, type_id: impl Into<String>) -> Self {
        let data = data.into();
        let hash = content_hash(&data);
        Self {
            data,
            hash,
            type_id: type_id.into(),
        }
    }
}

/// Hash serialized scene content into a short stable identity.
///
/// SHA-256 truncated to [`CONTENT_HASH_LEN`] lowercase hex characters.
pub fn content_hash(data: &str) -> String {
    let digest = sha2::Sha256::digest(data.as_bytes());
    let mut out = String::with_capacity(CONTENT_HASH_LEN);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
        if out.len() >= CONTENT_HASH_LEN {
            break;
        }
    }
    out.truncate(CONTENT_HASH_LEN);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::FrameloomError;

    struct FakeScene {
        payload: String,
        fail: bool,
    }

    impl Serializable for FakeScene {
        fn serialize(&self) -> FrameloomResult<String> {
            if self.fail {
                return Err(FrameloomError::snapshot("scene refused to serialize"));
            }
            Ok(self.payload.clone())
        }

        fn type_id(&self) -> &str {
            "fake"
        }
    }

    #[test]
    fn content_hash_is_deterministic_and_truncated() {
        let a = content_hash(r#"{"objects":[]}"#);
        let b = content_hash(r#"{"objects":[]}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), CONTENT_HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_yields_different_hash() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn capture_binds_hash_to_data() {
        let scene = FakeScene {
            payload: r#"{"objects":[{"id":"o1"}]}"#.to_owned(),
            fail: false,
        };
        let snap = SceneSnapshot::capture(&scene).unwrap();
        assert_eq!(snap.hash, content_hash(&snap.data));
        assert_eq!(snap.type_id, "fake");

        let again = SceneSnapshot::capture(&scene).unwrap();
        assert_eq!(snap, again);
    }

    #[test]
    fn capture_propagates_serialize_errors() {
        let scene = FakeScene {
            payload: String::new(),
            fail: true,
        };
        assert!(SceneSnapshot::capture(&scene).is_err());
    }
}
