// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;

use crate::{City, CitySymbol, FieldKind, Page, Street};

/// Number of entries returned per page by every directory implementation.
pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    NewSearch,
    LoadMore,
}

/// A query emitted by an autocomplete controller. The host runs it against an
/// [`AddressDirectory`] and hands the result back under the same `request_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub request_id: u64,
    pub field: FieldKind,
    pub scope: Option<CitySymbol>,
    pub search: String,
    pub page: u32,
    pub mode: FetchMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResponse {
    Cities(Page<City>),
    Streets(Page<Street>),
}

impl SearchResponse {
    pub fn field(&self) -> FieldKind {
        match self {
            Self::Cities(_) => FieldKind::City,
            Self::Streets(_) => FieldKind::Street,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Cities(page) => page.len(),
            Self::Streets(page) => page.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Paginated, case-insensitive substring lookup over cities and streets.
pub trait AddressDirectory {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>>;

    /// Streets of one city. Without a city the result is always empty.
    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>>;

    /// Fails when the backing store cannot answer queries.
    fn ping(&self) -> Result<()>;

    fn run(&self, request: &FetchRequest) -> Result<SearchResponse> {
        match request.field {
            FieldKind::City => self
                .search_cities(&request.search, request.page)
                .map(SearchResponse::Cities),
            FieldKind::Street => self
                .search_streets(request.scope, &request.search, request.page)
                .map(SearchResponse::Streets),
        }
    }
}

impl<D: AddressDirectory + ?Sized> AddressDirectory for &D {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        (**self).search_cities(search, page)
    }

    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        (**self).search_streets(city, search, page)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}

impl<D: AddressDirectory + ?Sized> AddressDirectory for std::sync::Arc<D> {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        (**self).search_cities(search, page)
    }

    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        (**self).search_streets(city, search, page)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}
