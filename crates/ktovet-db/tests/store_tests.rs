// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use ktovet_app::{AddressDirectory, CitySymbol, Dataset, PAGE_SIZE};
use ktovet_db::{ImportOutcome, SharedStore, Store, load_dataset, validate_db_path};
use ktovet_testkit::{
    AddressFaker, JERUSALEM, TEL_AVIV, city_row, street_row, tel_aviv_fixture, temp_db_path,
};

fn seeded() -> Result<Store> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    store.import_dataset(&tel_aviv_fixture(), false)?;
    Ok(store)
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("/tmp/ktovet.db").is_ok());
}

#[test]
fn bootstrap_creates_empty_schema() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    assert_eq!(store.city_count()?, 0);
    assert_eq!(store.street_count()?, 0);
    store.bootstrap()?;
    Ok(())
}

#[test]
fn bootstrap_rejects_foreign_database() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE projects (id INTEGER PRIMARY KEY);")?;
    let error = store
        .bootstrap()
        .expect_err("unrelated schema should be rejected");
    assert!(error.to_string().contains("missing required table `cities`"));
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.raw_connection().execute_batch(
        "
        CREATE TABLE cities (id INTEGER PRIMARY KEY, city_symbol INTEGER, city_name TEXT);
        CREATE TABLE streets (
          id INTEGER PRIMARY KEY, street_symbol INTEGER, street_name TEXT, city_symbol INTEGER
        );
        ",
    )?;
    let error = store
        .bootstrap()
        .expect_err("missing columns should be rejected");
    let message = error.to_string();
    assert!(message.contains("table `cities` is missing required columns"));
    assert!(message.contains("council_name"));
    Ok(())
}

#[test]
fn city_search_pages_through_twenty_five_matches() -> Result<()> {
    let store = seeded()?;

    let first = store.search_cities("תל אב", 0)?;
    assert_eq!(first.items.len(), PAGE_SIZE);
    assert!(first.has_more);
    assert!(first.items.iter().all(|c| c.city_name.contains("תל אב")));
    let names: Vec<&str> = first.items.iter().map(|c| c.city_name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);

    let second = store.search_cities("תל אב", 1)?;
    assert_eq!(second.items.len(), 5);
    assert!(!second.has_more);

    let third = store.search_cities("תל אב", 2)?;
    assert!(third.items.is_empty());
    assert!(!third.has_more);
    Ok(())
}

#[test]
fn exact_page_size_reports_no_more() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    let cities = (0..PAGE_SIZE as i64)
        .map(|i| city_row(100 + i, &format!("עיר {i:02}")))
        .collect();
    store.import_dataset(
        &Dataset {
            cities,
            streets: Vec::new(),
        },
        false,
    )?;

    let page = store.search_cities("", 0)?;
    assert_eq!(page.items.len(), PAGE_SIZE);
    assert!(!page.has_more);
    Ok(())
}

#[test]
fn city_search_is_case_insensitive_and_trimmed() -> Result<()> {
    let store = seeded()?;
    let page = store.search_cities("  tEL aViV ", 0)?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].city_name, "Tel Aviv Port");
    Ok(())
}

#[test]
fn search_text_is_not_a_like_pattern() -> Result<()> {
    let store = seeded()?;
    assert!(store.search_cities("%", 0)?.items.is_empty());
    assert!(store.search_cities("_", 0)?.items.is_empty());
    Ok(())
}

#[test]
fn ties_on_name_break_by_symbol() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    store.import_dataset(
        &Dataset {
            cities: vec![
                city_row(30, "זהה"),
                city_row(10, "זהה"),
                city_row(20, "זהה"),
            ],
            streets: Vec::new(),
        },
        false,
    )?;
    let symbols: Vec<i64> = store
        .search_cities("זהה", 0)?
        .items
        .iter()
        .map(|c| c.city_symbol.get())
        .collect();
    assert_eq!(symbols, vec![10, 20, 30]);
    Ok(())
}

#[test]
fn street_search_is_scoped_to_city() -> Result<()> {
    let store = seeded()?;

    let page = store.search_streets(Some(CitySymbol::new(TEL_AVIV)), "", 0)?;
    let names: Vec<&str> = page.items.iter().map(|s| s.street_name.as_str()).collect();
    assert_eq!(names, vec!["אלנבי", "דיזנגוף", "הרצל"]);
    assert!(!page.has_more);

    let page = store.search_streets(Some(CitySymbol::new(JERUSALEM)), "יפו", 0)?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].street_symbol.get(), 112);
    Ok(())
}

#[test]
fn street_search_without_city_is_empty() -> Result<()> {
    let store = seeded()?;
    let page = store.search_streets(None, "הרצל", 0)?;
    assert!(page.items.is_empty());
    assert!(!page.has_more);

    let page = store.search_streets(Some(CitySymbol::new(424_242)), "", 0)?;
    assert!(page.items.is_empty());
    Ok(())
}

#[test]
fn import_skips_seeded_database_unless_forced() -> Result<()> {
    let mut store = seeded()?;
    let before = store.city_count()?;

    let outcome = store.import_dataset(&tel_aviv_fixture(), false)?;
    assert_eq!(
        outcome,
        ImportOutcome::Skipped {
            existing_cities: before
        }
    );

    let replacement = Dataset {
        cities: vec![city_row(1, "אילת")],
        streets: vec![street_row(1, 10, "התמרים")],
    };
    let outcome = store.import_dataset(&replacement, true)?;
    assert_eq!(
        outcome,
        ImportOutcome::Imported {
            cities: 1,
            streets: 1
        }
    );
    assert_eq!(store.city_count()?, 1);
    assert_eq!(store.street_count()?, 1);
    Ok(())
}

#[test]
fn import_ignores_duplicates_and_orphans() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    let dataset = Dataset {
        cities: vec![city_row(1, "  אילת "), city_row(1, "אילת כפולה")],
        streets: vec![
            street_row(1, 10, "התמרים"),
            street_row(1, 10, "התמרים"),
            street_row(99, 10, "יתומה"),
        ],
    };
    let outcome = store.import_dataset(&dataset, false)?;
    assert_eq!(
        outcome,
        ImportOutcome::Imported {
            cities: 1,
            streets: 1
        }
    );
    let page = store.search_cities("", 0)?;
    assert_eq!(page.items[0].city_name, "אילת");
    Ok(())
}

#[test]
fn store_on_disk_survives_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let mut store = Store::open(&path)?;
        store.bootstrap()?;
        store.import_dataset(&AddressFaker::new(3).dataset(40, 5), false)?;
    }
    let store = Store::open(&path)?;
    store.bootstrap()?;
    store.ping()?;
    assert_eq!(store.city_count()?, 40);
    Ok(())
}

#[test]
fn shared_store_serves_directory_trait() -> Result<()> {
    let shared = SharedStore::new(seeded()?);
    shared.ping()?;
    let page = shared.search_cities("חיפה", 0)?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].city_symbol, CitySymbol::new(4000));
    Ok(())
}

#[test]
fn load_dataset_reads_register_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cities_path = dir.path().join("cities.json");
    let streets_path = dir.path().join("streets.json");
    std::fs::write(
        &cities_path,
        r#"[{"_id": 1, "סמל_ישוב": 5000, "שם_ישוב": "תל אביב - יפו"}]"#,
    )?;
    std::fs::write(
        &streets_path,
        r#"{"result": {"records": [{"_id": 1, "סמל_רחוב": 112, "שם_רחוב": "הרצל", "סמל_ישוב": "5000"}]}}"#,
    )?;

    let dataset = load_dataset(&cities_path, Some(&streets_path))?;
    assert_eq!(dataset.cities.len(), 1);
    assert_eq!(dataset.streets.len(), 1);

    let missing = dir.path().join("missing.json");
    let error = load_dataset(&missing, None).expect_err("missing file should fail");
    assert!(format!("{error:#}").contains("read dataset file"));
    Ok(())
}
