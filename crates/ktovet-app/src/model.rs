// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    City,
    Street,
}

impl FieldKind {
    pub const ALL: [Self; 2] = [Self::City, Self::Street];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Street => "street",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "city" => Some(Self::City),
            "street" => Some(Self::Street),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::City => "City",
            Self::Street => "Street",
        }
    }

    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::City => "type a city name",
            Self::Street => "type a street name",
        }
    }
}

/// An entry that can be offered in an autocomplete dropdown.
pub trait Suggestion: Clone {
    /// Text written back into the input when the entry is committed.
    fn label(&self) -> &str;

    /// Stable numeric key shown next to the label.
    fn key(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub city_symbol: CitySymbol,
    pub city_name: String,
}

impl Suggestion for City {
    fn label(&self) -> &str {
        &self.city_name
    }

    fn key(&self) -> i64 {
        self.city_symbol.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Street {
    pub street_symbol: StreetSymbol,
    pub street_name: String,
}

impl Suggestion for Street {
    fn label(&self) -> &str {
        &self.street_name
    }

    fn key(&self) -> i64 {
        self.street_symbol.get()
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
        }
    }

    /// Builds a page from a probe query that asked for `page_size + 1` rows.
    /// The extra row only signals that another page exists and is dropped.
    pub fn from_probe(mut rows: Vec<T>, page_size: usize) -> Self {
        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        Self {
            items: rows,
            has_more,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Full storage row for a city, including the administrative columns that
/// never leave the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CityRecord {
    pub id: Option<i64>,
    pub city_symbol: i64,
    pub city_name: String,
    pub city_english_name: String,
    pub district_symbol: i64,
    pub district_name: String,
    pub bureau_symbol: i64,
    pub bureau_name: String,
    pub council_symbol: i64,
    pub council_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreetRecord {
    pub id: Option<i64>,
    pub street_symbol: i64,
    pub street_name: String,
    pub city_symbol: i64,
}

/// Raw rows for a full import, in the order they are inserted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    pub cities: Vec<CityRecord>,
    pub streets: Vec<StreetRecord>,
}
