//! Search layer.
//!
//! A lookup query fans out to every registered searcher, each probing one
//! index of one entity type; partial results drain into a shared merger
//! that combines per-searcher similarities into a composite score and keeps
//! a bounded top-k.
//!
//! - **[`searchers`]**: the static registry of prefix and trigram searchers.
//! - **[`merger`]**: the per-call accumulator and top-k ranking.
//! - **[`trigram`]**: pg_trgm-style trigram extraction and similarity.

pub mod merger;
pub mod searchers;
pub mod trigram;
