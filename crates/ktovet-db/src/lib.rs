// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod dataset;

use anyhow::{Context, Result, anyhow, bail};
use ktovet_app::{
    AddressDirectory, City, CityRecord, CitySymbol, Dataset, PAGE_SIZE, Page, Street,
    StreetRecord, StreetSymbol,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub use dataset::{load_dataset, parse_cities, parse_streets};

pub const APP_NAME: &str = "ktovet";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "cities",
        &[
            "id",
            "city_symbol",
            "city_name",
            "city_english_name",
            "district_symbol",
            "district_name",
            "bureau_symbol",
            "bureau_name",
            "council_symbol",
            "council_name",
        ],
    ),
    (
        "streets",
        &["id", "street_symbol", "street_name", "city_symbol"],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_cities_city_name",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_cities_city_name ON cities (city_name, city_symbol);",
    },
    RequiredIndex {
        name: "idx_streets_city_symbol_street_name",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_streets_city_symbol_street_name ON streets (city_symbol, street_name, street_symbol);",
    },
    RequiredIndex {
        name: "idx_streets_city_symbol_street_symbol",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_streets_city_symbol_street_symbol ON streets (city_symbol, street_symbol);",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Cities were already present and no reseed was requested.
    Skipped { existing_cities: i64 },
    Imported { cities: usize, streets: usize },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)
    }

    /// Cheap round trip used as the health check.
    pub fn ping(&self) -> Result<()> {
        let one: i64 = self
            .conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .context("database did not answer; check that the file is readable")?;
        if one != 1 {
            bail!("database health check returned {one}");
        }
        Ok(())
    }

    pub fn city_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))
            .context("count cities")
    }

    pub fn street_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM streets", [], |row| row.get(0))
            .context("count streets")
    }

    pub fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        let (limit, offset) = page_window(page);
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT city_symbol, city_name
                FROM cities
                WHERE ?1 = '' OR instr(casefold(city_name), casefold(?1)) > 0
                ORDER BY city_name ASC, city_symbol ASC
                LIMIT ?2 OFFSET ?3
                ",
            )
            .context("prepare cities query")?;
        let rows = stmt
            .query_map(params![search.trim(), limit, offset], |row| {
                Ok(City {
                    city_symbol: CitySymbol::new(row.get(0)?),
                    city_name: row.get(1)?,
                })
            })
            .context("query cities")?;

        let rows = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect cities")?;
        Ok(Page::from_probe(rows, PAGE_SIZE))
    }

    pub fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        let Some(city) = city else {
            return Ok(Page::empty());
        };
        let (limit, offset) = page_window(page);
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT street_symbol, street_name
                FROM streets
                WHERE city_symbol = ?1
                  AND (?2 = '' OR instr(casefold(street_name), casefold(?2)) > 0)
                ORDER BY street_name ASC, street_symbol ASC
                LIMIT ?3 OFFSET ?4
                ",
            )
            .context("prepare streets query")?;
        let rows = stmt
            .query_map(params![city.get(), search.trim(), limit, offset], |row| {
                Ok(Street {
                    street_symbol: StreetSymbol::new(row.get(0)?),
                    street_name: row.get(1)?,
                })
            })
            .with_context(|| format!("query streets of city {city}"))?;

        let rows = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect streets")?;
        Ok(Page::from_probe(rows, PAGE_SIZE))
    }

    /// Loads a register export. An already seeded database is left alone
    /// unless `force` is set, in which case both tables are emptied first.
    pub fn import_dataset(&mut self, dataset: &Dataset, force: bool) -> Result<ImportOutcome> {
        let existing_cities = self.city_count()?;
        if existing_cities > 0 && !force {
            log::info!("{existing_cities} cities already present, skipping import");
            return Ok(ImportOutcome::Skipped { existing_cities });
        }

        let tx = self.conn.transaction().context("begin import")?;
        if force {
            log::warn!("reseed requested, emptying cities and streets");
            tx.execute("DELETE FROM streets", [])
                .context("empty streets")?;
            tx.execute("DELETE FROM cities", []).context("empty cities")?;
        }

        let mut cities = 0usize;
        {
            let mut insert = tx
                .prepare(
                    "
                    INSERT OR IGNORE INTO cities (
                      id, city_symbol, city_name, city_english_name,
                      district_symbol, district_name, bureau_symbol, bureau_name,
                      council_symbol, council_name
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .context("prepare city insert")?;
            for city in &dataset.cities {
                cities += insert_city(&mut insert, city)?;
            }
        }
        log::info!("imported {cities} of {} cities", dataset.cities.len());

        let mut streets = 0usize;
        {
            let mut insert = tx
                .prepare(
                    "
                    INSERT OR IGNORE INTO streets (id, street_symbol, street_name, city_symbol)
                    SELECT ?1, ?2, ?3, ?4
                    WHERE EXISTS (SELECT 1 FROM cities WHERE city_symbol = ?4)
                    ",
                )
                .context("prepare street insert")?;
            for street in &dataset.streets {
                streets += insert_street(&mut insert, street)?;
            }
        }
        let skipped = dataset.streets.len() - streets;
        if skipped > 0 {
            log::warn!("skipped {skipped} duplicate or orphaned streets");
        }
        log::info!("imported {streets} of {} streets", dataset.streets.len());

        tx.commit().context("commit import")?;
        Ok(ImportOutcome::Imported { cities, streets })
    }
}

impl AddressDirectory for Store {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        Store::search_cities(self, search, page)
    }

    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        Store::search_streets(self, city, search, page)
    }

    fn ping(&self) -> Result<()> {
        Store::ping(self)
    }
}

/// A store that can be handed to several threads at once. SQLite
/// connections are not `Sync`, so queries are serialized by the mutex.
pub struct SharedStore {
    inner: Mutex<Store>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&Store) -> Result<R>) -> Result<R> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl AddressDirectory for SharedStore {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        self.with(|store| store.search_cities(search, page))
    }

    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        self.with(|store| store.search_streets(city, search, page))
    }

    fn ping(&self) -> Result<()> {
        self.with(Store::ping)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("KTOVET_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set KTOVET_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("ktovet.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

/// LIMIT and OFFSET for a page, asking for one extra row to detect a next page.
fn page_window(page: u32) -> (i64, i64) {
    let size = PAGE_SIZE as i64;
    (size + 1, i64::from(page) * size)
}

fn insert_city(insert: &mut rusqlite::Statement<'_>, city: &CityRecord) -> Result<usize> {
    insert
        .execute(params![
            city.id,
            city.city_symbol,
            city.city_name.trim(),
            city.city_english_name.trim(),
            city.district_symbol,
            city.district_name.trim(),
            city.bureau_symbol,
            city.bureau_name.trim(),
            city.council_symbol,
            city.council_name.trim(),
        ])
        .with_context(|| format!("insert city {} ({})", city.city_symbol, city.city_name))
}

fn insert_street(insert: &mut rusqlite::Statement<'_>, street: &StreetRecord) -> Result<usize> {
    insert
        .execute(params![
            street.id,
            street.street_symbol,
            street.street_name.trim(),
            street.city_symbol,
        ])
        .with_context(|| {
            format!(
                "insert street {} ({}) of city {}",
                street.street_symbol, street.street_name, street.city_symbol
            )
        })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point --config at a ktovet database or remove the file to start fresh"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; remove the file and import again",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; remove the file and import again",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")?;
    register_casefold(conn)
}

/// SQLite's `lower()` only folds ASCII, so matching goes through Rust's
/// Unicode lowercase instead.
fn register_casefold(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )
    .context("register casefold function")
}
