//! `SQLite` store: schema, pragmas, migrations, and the fan-out search.
//!
//! One write connection serializes puts; every search probe opens its own
//! read-only connection so the fan-out runs truly in parallel under WAL.
//! Deadlines use SQLite's progress handler to interrupt a running
//! statement; an interrupted probe counts as "no rows".

use crate::error::DirectoryError;
use crate::id::ChecksumIdGenerator;
use crate::model::types::{Date, Entity, EntityType, Office, Patient, TypeAttributes};
use crate::search::merger::{EntitySim, ResultMerger};
use crate::search::searchers::{MatchOp, Searcher, SEARCHERS, SIMILARITY_COL};
use crate::search::trigram;
use crate::storage::{validate_search, Parameters, Storer};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OpenFlags, Row, Transaction};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS patient (
    entity_id TEXT PRIMARY KEY,
    last_name TEXT NOT NULL,
    first_name TEXT NOT NULL,
    middle_name TEXT,
    suffix TEXT,
    birthdate TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS office (
    entity_id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
";

/// How often (in SQLite VM ops) the deadline is polled. Low enough that
/// even single-row statements hit at least one poll.
const PROGRESS_POLL_OPS: i32 = 10;

/// Entity store backed by a SQLite database file.
pub struct SqliteStorer {
    path: PathBuf,
    conn: Mutex<Connection>,
    id_gen: ChecksumIdGenerator,
    params: Parameters,
    /// Match operators the opened store can serve. A searcher whose
    /// operator is missing contributes zero results instead of failing the
    /// search.
    capabilities: HashSet<MatchOp>,
}

impl SqliteStorer {
    pub fn open(
        path: &Path,
        id_gen: ChecksumIdGenerator,
        params: Parameters,
    ) -> Result<Self, DirectoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        init_meta(&conn)?;
        migrate(&mut conn)?;
        let capabilities = register_functions(&conn);

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            id_gen,
            params,
            capabilities,
        })
    }

    fn open_readonly(&self) -> Result<Connection, DirectoryError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        register_functions(&conn);
        Ok(conn)
    }

    /// Runs one searcher's probe on its own connection and returns the
    /// scored rows. Deadline-exceeded and no-rows both come back empty.
    fn run_searcher(
        &self,
        searcher: &Searcher,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Entity, f64)>, DirectoryError> {
        let conn = self.open_readonly()?;
        let et = searcher.entity_type;
        let sql = format!(
            "SELECT {cols}, {sim} FROM {table} WHERE {predicate} ORDER BY {SIMILARITY_COL} DESC LIMIT {limit}",
            cols = select_columns(et),
            sim = searcher.similarity_sql(),
            table = et.table_name(),
            predicate = searcher.predicate_sql(),
        );
        let preprocessed = searcher.preproc_query(query);
        debug!(searcher = searcher.name, sql = %sql, "searching for entities");

        set_deadline(&conn, self.params.search_timeout);
        let out = (|| -> rusqlite::Result<Vec<(Entity, f64)>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![preprocessed], |row| {
                let entity = scan_entity(et, row)?;
                let similarity: f64 = row.get(SIMILARITY_COL)?;
                Ok((entity, similarity))
            })?;
            rows.collect()
        })();
        clear_deadline(&conn);

        match out {
            Ok(rows) => Ok(rows),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Vec::new()),
            Err(err) if is_interrupted(&err) => {
                debug!(searcher = searcher.name, "probe deadline exceeded");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Storer for SqliteStorer {
    fn put_entity(&self, entity: &Entity) -> Result<String, DirectoryError> {
        if !entity.entity_id.is_empty() {
            self.id_gen.check(&entity.entity_id)?;
        }
        entity.validate()?;

        let et = EntityType::of(entity);
        let insert = entity.entity_id.is_empty();
        let entity_id = if insert {
            self.id_gen.generate(et.id_prefix())?
        } else {
            entity.entity_id.clone()
        };

        let mut conn = self.conn.lock();
        set_deadline(&conn, self.params.put_timeout);
        let out = (|| -> Result<(), DirectoryError> {
            let tx = conn.transaction()?;
            if insert {
                insert_entity(&tx, &entity_id, entity)?;
            } else {
                update_entity(&tx, &entity_id, entity)?;
            }
            tx.commit()?;
            Ok(())
        })();
        clear_deadline(&conn);

        match out {
            Ok(()) => {
                debug!(entity_id = %entity_id, insert, "stored entity");
                Ok(entity_id)
            }
            Err(DirectoryError::Store(err)) if insert && is_unique_violation(&err) => {
                Err(DirectoryError::DupGenEntityId)
            }
            Err(DirectoryError::Store(err)) if is_interrupted(&err) => {
                Err(DirectoryError::DeadlineExceeded)
            }
            Err(err) => Err(err),
        }
    }

    fn get_entity(&self, entity_id: &str) -> Result<Entity, DirectoryError> {
        self.id_gen.check(entity_id)?;
        let et = EntityType::from_id(entity_id)?;

        let conn = self.conn.lock();
        set_deadline(&conn, self.params.get_timeout);
        let out = conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE entity_id = ?1",
                select_columns(et),
                et.table_name()
            ),
            params![entity_id],
            |row| scan_entity(et, row),
        );
        clear_deadline(&conn);

        match out {
            Ok(entity) => {
                debug!(entity_id = %entity_id, "found entity");
                Ok(entity)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DirectoryError::MissingEntity),
            Err(err) if is_interrupted(&err) => Err(DirectoryError::DeadlineExceeded),
            Err(err) => Err(err.into()),
        }
    }

    fn search_entity(&self, query: &str, limit: usize) -> Result<Vec<Entity>, DirectoryError> {
        validate_search(query, limit)?;

        let merger = ResultMerger::new();
        let (err_tx, err_rx) = mpsc::channel::<DirectoryError>();
        std::thread::scope(|scope| {
            for searcher in SEARCHERS.iter() {
                if !self.capabilities.contains(&searcher.op) {
                    debug!(searcher = searcher.name, "operator unsupported, skipping");
                    continue;
                }
                let merger = &merger;
                let err_tx = err_tx.clone();
                scope.spawn(move || match self.run_searcher(searcher, query, limit) {
                    Ok(rows) => {
                        let n = rows.len();
                        merger.merge(rows, searcher.name);
                        debug!(searcher = searcher.name, rows = n, "searcher finished");
                    }
                    Err(err) => {
                        let _ = err_tx.send(err);
                    }
                });
            }
        });
        drop(err_tx);
        if let Some(err) = err_rx.try_iter().next() {
            return Err(err);
        }

        let ranked = merger.top(limit);
        debug!(query, results = ranked.len(), "ranked search results");
        Ok(ranked.into_iter().map(EntitySim::into_entity).collect())
    }
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )
}

fn init_meta(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    // Start at version 0 so migrate() applies the full schema on first open.
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES('schema_version', 0)",
        [],
    )?;
    Ok(())
}

fn migrate(conn: &mut Connection) -> Result<(), DirectoryError> {
    let current: i64 = conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
    )?;

    if current == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    match current {
        0 => {
            tx.execute_batch(MIGRATION_V1)?;
        }
        v => return Err(DirectoryError::UnsupportedSchemaVersion(v)),
    }
    tx.execute(
        "UPDATE meta SET value = ? WHERE key = 'schema_version'",
        params![SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

/// Registers the SQL scalars the searcher registry relies on and reports
/// which match operators this connection can serve.
fn register_functions(conn: &Connection) -> HashSet<MatchOp> {
    let mut capabilities = HashSet::from([MatchOp::Prefix]);
    let registered = conn.create_scalar_function(
        "trigram_similarity",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = ctx.get::<String>(0)?;
            let b = ctx.get::<String>(1)?;
            Ok(trigram::similarity(&a, &b))
        },
    );
    match registered {
        Ok(()) => {
            capabilities.insert(MatchOp::Trigram);
        }
        Err(err) => {
            warn!(%err, "trigram_similarity unavailable; trigram searchers disabled");
        }
    }
    capabilities
}

fn set_deadline(conn: &Connection, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    conn.progress_handler(
        PROGRESS_POLL_OPS,
        Some(move || Instant::now() >= deadline),
    );
}

fn clear_deadline(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Primary-key-first column list for SELECTs against the type's table; the
/// searcher similarity expression is always appended after these.
fn select_columns(et: EntityType) -> &'static str {
    match et {
        EntityType::Patient => "entity_id, last_name, first_name, middle_name, suffix, birthdate",
        EntityType::Office => "entity_id, name",
    }
}

fn insert_entity(
    tx: &Transaction<'_>,
    entity_id: &str,
    entity: &Entity,
) -> Result<(), DirectoryError> {
    match &entity.attributes {
        TypeAttributes::Patient(p) => insert_patient(tx, entity_id, p),
        TypeAttributes::Office(f) => insert_office(tx, entity_id, f),
    }
}

fn update_entity(
    tx: &Transaction<'_>,
    entity_id: &str,
    entity: &Entity,
) -> Result<(), DirectoryError> {
    match &entity.attributes {
        TypeAttributes::Patient(p) => update_patient(tx, entity_id, p),
        TypeAttributes::Office(f) => update_office(tx, entity_id, f),
    }
}

fn insert_patient(
    tx: &Transaction<'_>,
    entity_id: &str,
    p: &Patient,
) -> Result<(), DirectoryError> {
    let birthdate = p
        .birthdate
        .as_ref()
        .ok_or(DirectoryError::PatientMissingBirthdate)?;
    tx.execute(
        "INSERT INTO patient(entity_id, last_name, first_name, middle_name, suffix, birthdate)
         VALUES(?,?,?,?,?,?)",
        params![
            entity_id,
            p.last_name,
            p.first_name,
            p.middle_name,
            p.suffix,
            birthdate.iso8601()
        ],
    )?;
    Ok(())
}

fn update_patient(
    tx: &Transaction<'_>,
    entity_id: &str,
    p: &Patient,
) -> Result<(), DirectoryError> {
    let birthdate = p
        .birthdate
        .as_ref()
        .ok_or(DirectoryError::PatientMissingBirthdate)?;
    tx.execute(
        "UPDATE patient
         SET last_name = ?, first_name = ?, middle_name = ?, suffix = ?, birthdate = ?
         WHERE entity_id = ?",
        params![
            p.last_name,
            p.first_name,
            p.middle_name,
            p.suffix,
            birthdate.iso8601(),
            entity_id
        ],
    )?;
    Ok(())
}

fn insert_office(
    tx: &Transaction<'_>,
    entity_id: &str,
    f: &Office,
) -> Result<(), DirectoryError> {
    tx.execute(
        "INSERT INTO office(entity_id, name) VALUES(?,?)",
        params![entity_id, f.name],
    )?;
    Ok(())
}

fn update_office(
    tx: &Transaction<'_>,
    entity_id: &str,
    f: &Office,
) -> Result<(), DirectoryError> {
    tx.execute(
        "UPDATE office SET name = ? WHERE entity_id = ?",
        params![f.name, entity_id],
    )?;
    Ok(())
}

fn scan_entity(et: EntityType, row: &Row<'_>) -> rusqlite::Result<Entity> {
    match et {
        EntityType::Patient => scan_patient(row),
        EntityType::Office => scan_office(row),
    }
}

fn scan_patient(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let birthdate: String = row.get(5)?;
    let birthdate = Date::from_iso8601(&birthdate).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(Entity::patient(
        row.get::<_, String>(0)?,
        Patient {
            last_name: row.get(1)?,
            first_name: row.get(2)?,
            middle_name: row.get(3)?,
            suffix: row.get(4)?,
            birthdate: Some(birthdate),
        },
    ))
}

fn scan_office(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity::office(
        row.get::<_, String>(0)?,
        Office { name: row.get(1)? },
    ))
}
