//! Core data model types for an open email document, its subject, and its image references.

pub mod asset;
pub mod document;
pub mod subject;
