//! Query sources: raw text or a structured document that prints itself.

use std::fmt;
use std::sync::Arc;

/// A parsed query document.
///
/// Implementations must print the canonical text of the document. The printed text is
/// what gets hashed and sent over the wire, so a document and its printed string are
/// interchangeable everywhere in the pipeline.
pub trait QueryDocument: fmt::Debug + Send + Sync {
    fn print(&self) -> String;
}

/// Query as supplied by the caller
#[derive(Debug, Clone)]
pub enum QuerySource {
    Text(String),
    Document(Arc<dyn QueryDocument>),
}

impl QuerySource {
    /// Normalized query text, `None` when there is nothing to send
    pub fn normalize(&self) -> Option<String> {
        let text = match self {
            QuerySource::Text(text) => text.clone(),
            QuerySource::Document(document) => document.print(),
        };

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl From<&str> for QuerySource {
    fn from(text: &str) -> Self {
        QuerySource::Text(text.to_string())
    }
}

impl From<String> for QuerySource {
    fn from(text: String) -> Self {
        QuerySource::Text(text)
    }
}

impl From<Arc<dyn QueryDocument>> for QuerySource {
    fn from(document: Arc<dyn QueryDocument>) -> Self {
        QuerySource::Document(document)
    }
}
