//! Application-side data types.
//!
//! [`Document`] and [`Chunk`] come from the core crate; [`SourceItem`] is
//! what the manual scanner produces before normalisation.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub use hr_assistant_core::models::{Chunk, Document};

/// A manual file as read from disk.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub content_type: String,
    pub body: String,
}

impl SourceItem {
    /// Content hash deciding whether the stored chunks are stale.
    ///
    /// Modification time is left out so touching a file does not force a
    /// re-chunk.
    pub fn dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update([0]);
        hasher.update(self.source_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.body.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_markdown(&self) -> bool {
        self.content_type == "text/markdown"
    }

    pub fn to_document(&self, created_at: i64) -> Document {
        Document {
            id: Document::id_for(&self.source, &self.source_id),
            source: self.source.clone(),
            source_id: self.source_id.clone(),
            title: self.title.clone(),
            created_at,
            updated_at: self.updated_at.timestamp(),
            content_type: self.content_type.clone(),
            body: self.body.clone(),
            dedup_hash: self.dedup_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(body: &str) -> SourceItem {
        SourceItem {
            source: "manual".into(),
            source_id: "manual_empleado.md".into(),
            title: None,
            updated_at: Utc::now(),
            content_type: "text/markdown".into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_dedup_hash_tracks_body_only() {
        let a = item("# Vacaciones");
        let mut b = item("# Vacaciones");
        b.updated_at = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(a.dedup_hash(), b.dedup_hash());
        assert_ne!(a.dedup_hash(), item("# Nóminas").dedup_hash());
    }

    #[test]
    fn test_to_document_uses_stable_id() {
        let doc = item("x").to_document(42);
        assert_eq!(doc.id, Document::id_for("manual", "manual_empleado.md"));
        assert_eq!(doc.created_at, 42);
    }
}
