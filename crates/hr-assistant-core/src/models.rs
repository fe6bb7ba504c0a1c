//! Documents and chunks as they flow through indexing and retrieval.

use uuid::Uuid;

/// A manual document as stored in the index.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Source name (`"manual"` for the HR manual scanner).
    pub source: String,
    /// Identifier within the source, e.g. the path relative to the manual root.
    pub source_id: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub content_type: String,
    pub body: String,
    /// SHA-256 over source, source id and body. Unchanged hash means the
    /// stored chunks are still valid.
    pub dedup_hash: String,
}

impl Document {
    /// Deterministic document id for a `(source, source_id)` pair.
    pub fn id_for(source: &str, source_id: &str) -> String {
        Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{source}:{source_id}").as_bytes(),
        )
        .to_string()
    }
}

/// A retrievable passage of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Markdown heading path of the section the chunk came from,
    /// e.g. `"Vacaciones > Solicitud"`.
    pub heading: Option<String>,
    pub text: String,
    pub hash: String,
}

impl Chunk {
    /// Text handed to embedding providers: heading path plus body.
    pub fn embedding_input(&self) -> String {
        match &self.heading {
            Some(h) => format!("{h}\n\n{}", self.text),
            None => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable() {
        let a = Document::id_for("manual", "manual_empleado.md");
        let b = Document::id_for("manual", "manual_empleado.md");
        let c = Document::id_for("manual", "otro.md");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
