// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Reader for the government locality and street registers.
//!
//! Both registers are published as JSON with Hebrew column names, either as a
//! bare array of records or wrapped in a CKAN `datastore_search` response.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use ktovet_app::{CityRecord, Dataset, StreetRecord};
use serde_json::{Map, Value};

const RECORD_ID: &str = "_id";
const CITY_SYMBOL: &str = "סמל_ישוב";
const CITY_NAME: &str = "שם_ישוב";
const CITY_ENGLISH_NAME: &str = "שם_ישוב_לועזי";
const DISTRICT_SYMBOL: &str = "סמל_נפה";
const DISTRICT_NAME: &str = "שם_נפה";
const BUREAU_SYMBOL: &str = "סמל_לשכת_מנא";
const BUREAU_NAME: &str = "לשכה";
const COUNCIL_SYMBOL: &str = "סמל_מועצה_איזורית";
const COUNCIL_NAME: &str = "שם_מועצה";
const STREET_SYMBOL: &str = "סמל_רחוב";
const STREET_NAME: &str = "שם_רחוב";

pub fn load_dataset(cities_path: &Path, streets_path: Option<&Path>) -> Result<Dataset> {
    let cities = parse_cities(&read(cities_path)?)
        .with_context(|| format!("parse cities from {}", cities_path.display()))?;
    let streets = match streets_path {
        Some(path) => parse_streets(&read(path)?)
            .with_context(|| format!("parse streets from {}", path.display()))?,
        None => Vec::new(),
    };
    Ok(Dataset { cities, streets })
}

pub fn parse_cities(json: &str) -> Result<Vec<CityRecord>> {
    records(json)?
        .iter()
        .enumerate()
        .map(|(index, record)| {
            city_record(record).with_context(|| format!("city record #{index}"))
        })
        .collect()
}

pub fn parse_streets(json: &str) -> Result<Vec<StreetRecord>> {
    records(json)?
        .iter()
        .enumerate()
        .map(|(index, record)| {
            street_record(record).with_context(|| format!("street record #{index}"))
        })
        .collect()
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read dataset file {}", path.display()))
}

fn records(json: &str) -> Result<Vec<Map<String, Value>>> {
    let value: Value = serde_json::from_str(json).context("dataset is not valid JSON")?;
    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object
            .get_mut("result")
            .and_then(|result| result.get_mut("records"))
            .map(Value::take)
        {
            Some(Value::Array(items)) => items,
            _ => bail!(
                "dataset object has no `result.records` array; pass the register export or its records array"
            ),
        },
        _ => bail!("dataset must be a JSON array of records"),
    };

    array
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(anyhow!("record #{index} is not an object: {other}")),
        })
        .collect()
}

fn city_record(record: &Map<String, Value>) -> Result<CityRecord> {
    Ok(CityRecord {
        id: int_field(record, RECORD_ID)?,
        city_symbol: required_int(record, CITY_SYMBOL)?,
        city_name: required_text(record, CITY_NAME)?,
        city_english_name: text_field(record, CITY_ENGLISH_NAME).unwrap_or_default(),
        district_symbol: int_field(record, DISTRICT_SYMBOL)?.unwrap_or(0),
        district_name: text_field(record, DISTRICT_NAME).unwrap_or_default(),
        bureau_symbol: int_field(record, BUREAU_SYMBOL)?.unwrap_or(0),
        bureau_name: text_field(record, BUREAU_NAME).unwrap_or_default(),
        council_symbol: int_field(record, COUNCIL_SYMBOL)?.unwrap_or(0),
        council_name: text_field(record, COUNCIL_NAME).unwrap_or_default(),
    })
}

fn street_record(record: &Map<String, Value>) -> Result<StreetRecord> {
    Ok(StreetRecord {
        id: int_field(record, RECORD_ID)?,
        street_symbol: required_int(record, STREET_SYMBOL)?,
        street_name: required_text(record, STREET_NAME)?,
        city_symbol: required_int(record, CITY_SYMBOL)?,
    })
}

fn required_int(record: &Map<String, Value>, key: &str) -> Result<i64> {
    int_field(record, key)?.ok_or_else(|| anyhow!("missing numeric field `{key}`"))
}

fn required_text(record: &Map<String, Value>, key: &str) -> Result<String> {
    text_field(record, key)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("missing text field `{key}`"))
}

/// Registers mix JSON numbers and numeric strings for the same column.
fn int_field(record: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(value) => Ok(Some(value)),
            None => match number.as_f64() {
                Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
                    Ok(Some(value as i64))
                }
                _ => bail!("field `{key}` is not an integer: {number}"),
            },
        },
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| anyhow!("field `{key}` is not an integer: {raw:?}"))
        }
        Some(other) => bail!("field `{key}` is not an integer: {other}"),
    }
}

fn text_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(raw) => Some(raw.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
