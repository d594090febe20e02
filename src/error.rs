//! Error taxonomy for the directory core.

use thiserror::Error;

/// Errors surfaced by the directory core.
///
/// Validation variants are deterministic functions of the request and are
/// produced before any store work happens. [`DirectoryError::DupGenEntityId`]
/// is retryable: resubmit the entity with an empty `entity_id` so a fresh one
/// is generated.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("patient missing last name")]
    PatientMissingLastName,

    #[error("patient missing first name")]
    PatientMissingFirstName,

    #[error("patient missing birthdate")]
    PatientMissingBirthdate,

    #[error("office missing name")]
    OfficeMissingName,

    /// Malformed or checksum-failing entity ID. The reason distinguishes
    /// malformed from bad-checksum at the message level only.
    #[error("invalid entity ID: {0}")]
    InvalidEntityId(String),

    /// ID prefix not assigned to any known entity type.
    #[error("unknown entity type prefix {0:?}")]
    UnknownEntityType(char),

    #[error("no entity with given ID")]
    MissingEntity,

    /// A freshly generated ID collided with an existing row.
    #[error("duplicate entity ID generated")]
    DupGenEntityId,

    #[error("search query shorter than min length 4")]
    SearchQueryTooShort,

    #[error("search query longer than max length 32")]
    SearchQueryTooLong,

    #[error("search limit smaller than min value 1")]
    SearchLimitTooSmall,

    #[error("search limit larger than max value 8")]
    SearchLimitTooLarge,

    #[error("date not in YYYY-MM-DD or RFC 3339 form: {0:?}")]
    InvalidDate(String),

    /// A put or get exceeded its per-operation deadline.
    #[error("store deadline exceeded")]
    DeadlineExceeded,

    #[error("unsupported schema version {0}")]
    UnsupportedSchemaVersion(i64),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}
