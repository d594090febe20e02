//! The static searcher registry.
//!
//! One searcher per (entity type, attribute index): a prefix searcher on the
//! ID column of each type, plus a trigram searcher per semantically
//! searchable attribute group. The list is built once at startup and never
//! mutated; new entity types extend it by contributing their own entries.

use crate::model::types::EntityType;
use crate::search::trigram;
use crate::storage::{ENTITY_ID_COL, FIRST_NAME_COL, LAST_NAME_COL, NAME_COL};
use once_cell::sync::Lazy;

/// Alias under which every probe returns its similarity score.
pub const SIMILARITY_COL: &str = "sim";

/// How a searcher's indexed expression is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    /// B-tree `LIKE prefix%` probe. Similarity is the coverage ratio of the
    /// query length to the indexed value length.
    Prefix,
    /// Trigram probe through the `trigram_similarity` scalar, cut off at
    /// the pg_trgm default threshold.
    Trigram,
}

/// One index-backed way of finding candidate entities for a query.
#[derive(Debug, Clone)]
pub struct Searcher {
    /// Unique label; the key under which per-entity similarity is recorded.
    pub name: &'static str,
    pub entity_type: EntityType,
    /// Column or composed expression the probe runs against.
    pub indexed_expr: String,
    pub op: MatchOp,
    pub case_sensitive: bool,
}

pub static SEARCHERS: Lazy<Vec<Searcher>> = Lazy::new(|| {
    vec![
        Searcher {
            name: "PatientEntityID",
            entity_type: EntityType::Patient,
            indexed_expr: ENTITY_ID_COL.to_string(),
            op: MatchOp::Prefix,
            case_sensitive: false,
        },
        Searcher {
            name: "PatientName",
            entity_type: EntityType::Patient,
            indexed_expr: format!(
                "{} || ' ' || {}",
                non_empty_upper(LAST_NAME_COL),
                non_empty_upper(FIRST_NAME_COL)
            ),
            op: MatchOp::Trigram,
            case_sensitive: false,
        },
        Searcher {
            name: "OfficeEntityID",
            entity_type: EntityType::Office,
            indexed_expr: ENTITY_ID_COL.to_string(),
            op: MatchOp::Prefix,
            case_sensitive: false,
        },
        Searcher {
            name: "OfficeName",
            entity_type: EntityType::Office,
            indexed_expr: non_empty_upper(NAME_COL),
            op: MatchOp::Trigram,
            case_sensitive: false,
        },
    ]
});

fn non_empty_upper(col: &str) -> String {
    format!("COALESCE(UPPER({col}), '')")
}

impl Searcher {
    /// Maps raw user text to the value bound to the probe's parameter.
    /// Prefix probes get an upper-cased, `%`-terminated pattern; trigram
    /// probes get the upper-cased text as is.
    pub fn preproc_query(&self, raw: &str) -> String {
        let query = if self.case_sensitive {
            raw.to_string()
        } else {
            raw.to_uppercase()
        };
        match self.op {
            MatchOp::Prefix => format!("{query}%"),
            MatchOp::Trigram => query,
        }
    }

    /// SQL predicate over `?1`, the preprocessed query.
    pub fn predicate_sql(&self) -> String {
        match self.op {
            MatchOp::Prefix => format!("{} LIKE ?1", self.indexed_expr),
            MatchOp::Trigram => format!(
                "trigram_similarity({}, ?1) >= {}",
                self.indexed_expr,
                trigram::SIMILARITY_THRESHOLD
            ),
        }
    }

    /// SELECT expression for the `[0, 1]` similarity, aliased to `sim`.
    pub fn similarity_sql(&self) -> String {
        match self.op {
            // The prefix preprocessor appends exactly one '%', so the raw
            // query length is LENGTH(?1) - 1.
            MatchOp::Prefix => format!(
                "(LENGTH(?1) - 1) * 1.0 / LENGTH({}) AS {}",
                self.indexed_expr, SIMILARITY_COL
            ),
            MatchOp::Trigram => format!(
                "trigram_similarity({}, ?1) AS {}",
                self.indexed_expr, SIMILARITY_COL
            ),
        }
    }
}
