//! Typed entity records.
//!
//! An [`Entity`] is a tagged-variant record: an identifier plus exactly one
//! type-specific payload. All type dispatch in the crate goes through
//! [`EntityType::of`] (payload → type) and [`EntityType::from_id`] (ID
//! prefix → type); nothing else inspects the variant tag.

use crate::error::DirectoryError;
use chrono::Datelike;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A directory record plus its type-tagged payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Checksum-bearing identifier; empty until the first put.
    #[serde(default)]
    pub entity_id: String,
    pub attributes: TypeAttributes,
}

/// The one-of payload carried by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeAttributes {
    Patient(Patient),
    Office(Office),
}

/// A person record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub birthdate: Option<Date>,
}

/// An organization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub name: String,
}

impl Entity {
    /// Wraps a patient payload, with an empty ID when creating.
    pub fn patient(entity_id: impl Into<String>, patient: Patient) -> Self {
        Self {
            entity_id: entity_id.into(),
            attributes: TypeAttributes::Patient(patient),
        }
    }

    /// Wraps an office payload, with an empty ID when creating.
    pub fn office(entity_id: impl Into<String>, office: Office) -> Self {
        Self {
            entity_id: entity_id.into(),
            attributes: TypeAttributes::Office(office),
        }
    }

    /// Checks the type-specific attribute invariants. Deterministic and
    /// store-free; runs before any write.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        match &self.attributes {
            TypeAttributes::Patient(p) => p.validate(),
            TypeAttributes::Office(f) => f.validate(),
        }
    }
}

impl Patient {
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.last_name.is_empty() {
            return Err(DirectoryError::PatientMissingLastName);
        }
        if self.first_name.is_empty() {
            return Err(DirectoryError::PatientMissingFirstName);
        }
        if self.birthdate.is_none() {
            return Err(DirectoryError::PatientMissingBirthdate);
        }
        Ok(())
    }
}

impl Office {
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.name.is_empty() {
            return Err(DirectoryError::OfficeMissingName);
        }
        Ok(())
    }
}

/// Closed enumeration of supported record shapes.
///
/// Extending the directory with a new type means adding a variant here with
/// an unassigned one-character prefix, a table in the store schema, and its
/// searchers in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Patient,
    Office,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::Patient, EntityType::Office];

    /// The type of an entity, recovered from its payload.
    pub fn of(entity: &Entity) -> EntityType {
        match entity.attributes {
            TypeAttributes::Patient(_) => EntityType::Patient,
            TypeAttributes::Office(_) => EntityType::Office,
        }
    }

    /// The type encoded in an entity ID's first character.
    pub fn from_id(entity_id: &str) -> Result<EntityType, DirectoryError> {
        let prefix = entity_id
            .chars()
            .next()
            .ok_or_else(|| DirectoryError::InvalidEntityId("empty entity ID".into()))?;
        Self::ALL
            .into_iter()
            .find(|et| et.id_prefix() == prefix)
            .ok_or(DirectoryError::UnknownEntityType(prefix))
    }

    /// One-character ID prefix; globally unique across types.
    pub fn id_prefix(self) -> char {
        match self {
            EntityType::Patient => 'P',
            EntityType::Office => 'F',
        }
    }

    /// Store table holding this type's rows.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityType::Patient => "patient",
            EntityType::Office => "office",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Patient => write!(f, "Patient"),
            EntityType::Office => write!(f, "Office"),
        }
    }
}

/// A calendar day. Serializes as `YYYY-MM-DD` and round-trips bit-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub fn new(year: u32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// The `YYYY-MM-DD` ISO 8601 date string.
    pub fn iso8601(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Parses an ISO date, also accepting an RFC 3339 timestamp and keeping
    /// its date portion.
    pub fn from_iso8601(s: &str) -> Result<Self, DirectoryError> {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(d.into());
        }
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.date_naive().into())
            .map_err(|_| DirectoryError::InvalidDate(s.to_string()))
    }
}

impl From<chrono::NaiveDate> for Date {
    fn from(d: chrono::NaiveDate) -> Self {
        Self {
            year: d.year() as u32,
            month: d.month(),
            day: d.day(),
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso8601())
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.iso8601())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Date::from_iso8601(&s).map_err(D::Error::custom)
    }
}
