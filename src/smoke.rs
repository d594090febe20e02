//! Put/search smoke workload against a local store.
//!
//! Puts a batch of generated entities, then runs searches with queries
//! derived from what was stored (ID prefixes, lowercased names, "last,
//! first" permutations), asserting every search finds something.

use crate::model::types::{Date, Entity, Office, Patient};
use crate::storage::{Storer, MAX_SEARCH_LIMIT, MAX_SEARCH_QUERY_LEN, MIN_SEARCH_QUERY_LEN};
use anyhow::ensure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

const LAST_NAMES: &[&str] = &[
    "Abbott", "Baldwin", "Castillo", "Donovan", "Eriksen", "Farrell", "Goldberg", "Hawkins",
    "Iverson", "Jamison", "Keller", "Lindqvist", "Moreno", "Navarro", "Ostrowski", "Pearson",
];

const FIRST_NAMES: &[&str] = &[
    "Adele", "Bruno", "Celia", "Dmitri", "Elena", "Felix", "Greta", "Hector", "Ingrid", "Jonas",
    "Katya", "Lionel", "Marta", "Nils", "Ophelia", "Pavel",
];

const OFFICE_QUALIFIERS: &[&str] = &[
    "Cedar", "Harbor", "Lakeside", "Meridian", "Northgate", "Riverside", "Summit", "Westwood",
];

const OFFICE_KINDS: &[&str] = &["Clinic", "Medical Group", "Health Center", "Practice"];

#[derive(Debug, Clone)]
pub struct SmokeOptions {
    pub entities: usize,
    pub searches: usize,
    pub seed: u64,
}

pub fn run_smoke(storer: &dyn Storer, opts: &SmokeOptions) -> anyhow::Result<()> {
    ensure!(
        opts.entities > 0 || opts.searches == 0,
        "cannot search an empty batch"
    );
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let mut stored = Vec::with_capacity(opts.entities);
    for _ in 0..opts.entities {
        let mut entity = random_entity(&mut rng);
        let entity_id = storer.put_entity(&entity)?;
        info!(entity_id = %entity_id, "entity put succeeded");
        entity.entity_id = entity_id;
        stored.push(entity);
    }

    for _ in 0..opts.searches {
        let entity = &stored[rng.gen_range(0..stored.len())];
        let query = search_query_for(&mut rng, entity);
        let hits = storer.search_entity(&query, MAX_SEARCH_LIMIT)?;
        ensure!(!hits.is_empty(), "search {query:?} returned no results");
        info!(query = %query, results = hits.len(), "search succeeded");
    }

    Ok(())
}

fn random_entity(rng: &mut StdRng) -> Entity {
    if rng.gen_bool(0.5) {
        Entity::patient(
            "",
            Patient {
                last_name: pick(rng, LAST_NAMES).to_string(),
                first_name: pick(rng, FIRST_NAMES).to_string(),
                middle_name: None,
                suffix: None,
                birthdate: Some(Date::new(
                    1950 + rng.gen_range(0..60),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28),
                )),
            },
        )
    } else {
        Entity::office(
            "",
            Office {
                name: format!("{} {}", pick(rng, OFFICE_QUALIFIERS), pick(rng, OFFICE_KINDS)),
            },
        )
    }
}

/// A query that should find the given stored entity.
fn search_query_for(rng: &mut StdRng, entity: &Entity) -> String {
    use crate::model::types::TypeAttributes;

    let mut query = String::new();
    while query.chars().count() < MIN_SEARCH_QUERY_LEN {
        query = match &entity.attributes {
            TypeAttributes::Patient(p) => match rng.gen_range(0..6) {
                0 => entity.entity_id.clone(),
                1 => p.last_name.clone(),
                2 => p.first_name.clone(),
                3 => format!("{} {}", p.last_name, p.first_name),
                4 => format!("{}, {}", p.last_name, p.first_name),
                _ => format!("{} {}", p.first_name, p.last_name),
            },
            TypeAttributes::Office(f) => match rng.gen_range(0..2) {
                0 => entity.entity_id.clone(),
                _ => f.name.clone(),
            },
        };
    }
    query.to_lowercase().chars().take(MAX_SEARCH_QUERY_LEN).collect()
}

fn pick<'a>(rng: &mut StdRng, pool: &'a [&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ChecksumIdGenerator;
    use crate::storage::sqlite::SqliteStorer;
    use crate::storage::Parameters;

    #[test]
    fn smoke_workload_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SqliteStorer::open(
            &tmp.path().join("smoke.db"),
            ChecksumIdGenerator::seeded(11),
            Parameters::default(),
        )
        .unwrap();

        let opts = SmokeOptions {
            entities: 12,
            searches: 8,
            seed: 11,
        };
        run_smoke(&store, &opts).unwrap();
    }

    #[test]
    fn derived_queries_respect_the_search_gates() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let mut entity = random_entity(&mut rng);
            entity.entity_id = "PABCDEF1G".into();
            let query = search_query_for(&mut rng, &entity);
            let len = query.chars().count();
            assert!((MIN_SEARCH_QUERY_LEN..=MAX_SEARCH_QUERY_LEN).contains(&len));
        }
    }
}
