//! Known-face index.
//!
//! Built once by the preload phase through [`KnownFaceIndexBuilder`], then
//! frozen into a [`KnownFaceIndex`] that only exposes read access. The
//! frozen index is cheap to clone and safe to share across request tasks
//! without locking.

use crate::types::Embedding;
use std::sync::Arc;

/// One known face: the identity key used for record lookup and its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownFace {
    pub identity_key: String,
    pub descriptor: Embedding,
}

/// Append-only collection of known faces, used during preload.
///
/// Duplicate identity keys are kept as independent entries.
#[derive(Debug, Default)]
pub struct KnownFaceIndexBuilder {
    entries: Vec<KnownFace>,
}

impl KnownFaceIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry. Never rejects.
    pub fn append(&mut self, identity_key: impl Into<String>, descriptor: Embedding) {
        self.entries.push(KnownFace {
            identity_key: identity_key.into(),
            descriptor,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close the index for writing. No entry can be added or removed afterwards.
    pub fn freeze(self) -> KnownFaceIndex {
        KnownFaceIndex {
            entries: self.entries.into(),
        }
    }
}

/// Read-only known-face index, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct KnownFaceIndex {
    entries: Arc<[KnownFace]>,
}

impl KnownFaceIndex {
    /// All entries in insertion order.
    pub fn all(&self) -> &[KnownFace] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor length of the indexed faces, `None` when empty.
    pub fn descriptor_len(&self) -> Option<usize> {
        self.entries.first().map(|face| face.descriptor.len())
    }
}

impl FromIterator<(String, Embedding)> for KnownFaceIndex {
    fn from_iter<I: IntoIterator<Item = (String, Embedding)>>(iter: I) -> Self {
        let mut builder = KnownFaceIndexBuilder::new();
        for (key, descriptor) in iter {
            builder.append(key, descriptor);
        }
        builder.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut builder = KnownFaceIndexBuilder::new();
        builder.append("carol", Embedding::new(vec![0.0, 1.0]));
        builder.append("alice", Embedding::new(vec![1.0, 0.0]));
        builder.append("bob", Embedding::new(vec![0.5, 0.5]));
        assert_eq!(builder.len(), 3);

        let index = builder.freeze();
        let keys: Vec<&str> = index.all().iter().map(|f| f.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_duplicate_keys_are_retained() {
        let mut builder = KnownFaceIndexBuilder::new();
        builder.append("alice", Embedding::new(vec![1.0, 0.0]));
        builder.append("alice", Embedding::new(vec![0.0, 1.0]));

        let index = builder.freeze();
        assert_eq!(index.len(), 2);
        assert_ne!(index.all()[0].descriptor, index.all()[1].descriptor);
    }

    #[test]
    fn test_empty_index() {
        let index = KnownFaceIndexBuilder::new().freeze();
        assert!(index.is_empty());
        assert!(index.all().is_empty());
        assert_eq!(index.descriptor_len(), None);
    }

    #[test]
    fn test_descriptor_len() {
        let mut builder = KnownFaceIndexBuilder::new();
        builder.append("alice", Embedding::new(vec![1.0, 0.0, 0.0]));
        assert_eq!(builder.freeze().descriptor_len(), Some(3));
    }

    #[test]
    fn test_clones_share_entries() {
        let index: KnownFaceIndex = vec![("dave".to_string(), Embedding::new(vec![1.0]))]
            .into_iter()
            .collect();
        let clone = index.clone();
        assert!(std::ptr::eq(index.all().as_ptr(), clone.all().as_ptr()));
    }
}
