// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use ktovet_app::{CityRecord, Dataset, StreetRecord};
use std::path::PathBuf;

const CITY_STEMS: [&str; 16] = [
    "אבן", "גבעת", "כפר", "מעלה", "נווה", "עין", "קריית", "רמת", "שדה", "תל", "בית", "מגדל",
    "גן", "הר", "נחל", "מצפה",
];
const CITY_SUFFIXES: [&str; 16] = [
    "יהודה", "השרון", "הגליל", "ורד", "אורנים", "הדר", "שמואל", "יצחק", "חיים", "ברוך",
    "זיו", "אביב", "מנשה", "אפרים", "הנגב", "הכרמל",
];
const DISTRICTS: [(i64, &str); 6] = [
    (11, "ירושלים"),
    (21, "צפת"),
    (31, "חיפה"),
    (41, "השרון"),
    (51, "תל אביב"),
    (61, "אשקלון"),
];
const STREET_STEMS: [&str; 18] = [
    "הרצל", "ז'בוטינסקי", "ויצמן", "בן גוריון", "רוטשילד", "הנביאים", "הגפן", "הזית",
    "התאנה", "הרימון", "האלה", "הברוש", "האורן", "הדקל", "השקד", "הנרקיס", "הכלנית",
    "הרקפת",
];
const STREET_KINDS: [&str; 5] = ["", "שדרות", "סמטת", "דרך", "כיכר"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Generates plausible locality and street register rows. The same seed always
/// yields the same dataset.
#[derive(Debug, Clone)]
pub struct AddressFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl AddressFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn city_name(&mut self) -> String {
        format!("{} {}", self.pick(&CITY_STEMS), self.pick(&CITY_SUFFIXES))
    }

    pub fn street_name(&mut self) -> String {
        let kind = self.pick(&STREET_KINDS);
        let stem = self.pick(&STREET_STEMS);
        if kind.is_empty() {
            stem.to_owned()
        } else {
            format!("{kind} {stem}")
        }
    }

    pub fn city(&mut self, city_symbol: i64) -> CityRecord {
        let (district_symbol, district_name) = DISTRICTS[self.rng.int_n(DISTRICTS.len())];
        CityRecord {
            id: None,
            city_symbol,
            city_name: self.city_name(),
            city_english_name: String::new(),
            district_symbol,
            district_name: district_name.to_owned(),
            bureau_symbol: district_symbol * 10 + self.rng.int_n(5) as i64,
            bureau_name: district_name.to_owned(),
            council_symbol: 0,
            council_name: String::new(),
        }
    }

    pub fn street(&mut self, city_symbol: i64, street_symbol: i64) -> StreetRecord {
        StreetRecord {
            id: None,
            street_symbol,
            street_name: self.street_name(),
            city_symbol,
        }
    }

    /// `cities` localities with symbols starting at 1000, each with up to
    /// `max_streets` streets. Generated names repeat, so symbols are what keep
    /// the rows distinct.
    pub fn dataset(&mut self, cities: usize, max_streets: usize) -> Dataset {
        let mut dataset = Dataset::default();
        for index in 0..cities {
            let city_symbol = 1000 + index as i64 * 10;
            dataset.cities.push(self.city(city_symbol));
            let street_count = self.rng.int_n(max_streets + 1);
            for street_index in 0..street_count {
                dataset
                    .streets
                    .push(self.street(city_symbol, 100 + street_index as i64));
            }
        }
        dataset
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("ktovet.db");
    Ok((dir, db_path))
}

pub const TEL_AVIV: i64 = 5000;
pub const JERUSALEM: i64 = 3000;
pub const TEL_AVIV_LIKE_CITIES: usize = 25;

/// A small register with exactly 25 cities whose name contains "תל אב", a few
/// that do not, and three streets in Tel Aviv.
pub fn tel_aviv_fixture() -> Dataset {
    let mut cities = vec![city_row(TEL_AVIV, "תל אביב - יפו")];
    for index in 1..TEL_AVIV_LIKE_CITIES as i64 {
        cities.push(city_row(9000 + index, &format!("שכונת תל אביב {index:02}")));
    }
    cities.extend([
        city_row(JERUSALEM, "ירושלים"),
        city_row(4000, "חיפה"),
        city_row(1061, "תל מונד"),
        city_row(1113, "אביבים"),
        city_row(1200, "Tel Aviv Port"),
    ]);

    let streets = vec![
        street_row(TEL_AVIV, 112, "הרצל"),
        street_row(TEL_AVIV, 101, "אלנבי"),
        street_row(TEL_AVIV, 203, "דיזנגוף"),
        street_row(JERUSALEM, 112, "יפו"),
        street_row(JERUSALEM, 140, "קינג ג'ורג'"),
    ];

    Dataset { cities, streets }
}

pub fn city_row(city_symbol: i64, city_name: &str) -> CityRecord {
    CityRecord {
        city_symbol,
        city_name: city_name.to_owned(),
        ..CityRecord::default()
    }
}

pub fn street_row(city_symbol: i64, street_symbol: i64, street_name: &str) -> StreetRecord {
    StreetRecord {
        id: None,
        street_symbol,
        street_name: street_name.to_owned(),
        city_symbol,
    }
}
