// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use ktovet_db::{SharedStore, Store};
use ktovet_server::start;
use ktovet_testkit::tel_aviv_fixture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn seeded_directory() -> Result<Arc<SharedStore>> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    store.import_dataset(&tel_aviv_fixture(), false)?;
    Ok(Arc::new(SharedStore::new(store)))
}

fn get(client: &reqwest::blocking::Client, url: &str) -> Result<(u16, Option<String>, Value)> {
    let response = client.get(url).send()?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.json::<Value>()?;
    Ok((status, content_type, body))
}

#[test]
fn serves_cities_and_streets_over_http() -> Result<()> {
    let handle = start("127.0.0.1:0", seeded_directory()?, 2)?;
    let base = handle.base_url();
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let (status, content_type, body) = get(
        &client,
        &format!("{base}/streets?citySymbol=5000&search=&page=0"),
    )?;
    assert_eq!(status, 200);
    assert_eq!(
        content_type.as_deref(),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(body["items"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["hasMore"], false);

    let (status, _, body) = get(&client, &format!("{base}/cities?search=תל אב&page=0"))?;
    assert_eq!(status, 200);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(20));
    assert_eq!(body["hasMore"], true);

    let (status, _, body) = get(&client, &format!("{base}/cities?search=תל אב&page=1"))?;
    assert_eq!(status, 200);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(5));
    assert_eq!(body["hasMore"], false);

    let (status, _, body) = get(&client, &format!("{base}/cities?page=-1"))?;
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({"error": "Invalid input", "message": "Page must be a non-negative number"})
    );

    let (status, _, body) = get(&client, &format!("{base}/health"))?;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "ok"}));

    handle.shutdown()?;
    Ok(())
}

#[test]
fn rejects_invalid_worker_counts() -> Result<()> {
    let directory = seeded_directory()?;
    assert!(start("127.0.0.1:0", directory.clone(), 0).is_err());
    assert!(start("127.0.0.1:0", directory, 65).is_err());
    Ok(())
}
