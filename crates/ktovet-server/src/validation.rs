// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use ktovet_app::CitySymbol;
use serde::Serialize;

pub const PAGE_MESSAGE: &str = "Page must be a non-negative number";
pub const CITY_SYMBOL_MESSAGE: &str = "citySymbol must be a valid number";

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.to_owned(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(400, "Invalid input", message)
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(404, "Not Found", format!("no route for {path}"))
    }

    pub fn method_not_allowed(method: &str) -> Self {
        Self::new(
            405,
            "Method Not Allowed",
            format!("{method} is not supported; use GET"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "Internal Server Error", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(503, "Service Unavailable", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.error, self.message)
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Absent or blank means the first page.
pub fn parse_page(raw: Option<&str>) -> ApiResult<u32> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let value = trimmed
        .parse::<i64>()
        .map_err(|_| ApiError::invalid_input(PAGE_MESSAGE))?;
    if value < 0 {
        return Err(ApiError::invalid_input(PAGE_MESSAGE));
    }
    u32::try_from(value)
        .map_err(|_| ApiError::invalid_input(format!("Page {value} is out of range")))
}

pub fn parse_city_symbol(raw: Option<&str>) -> ApiResult<CitySymbol> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<i64>().ok())
        .map(CitySymbol::new)
        .ok_or_else(|| ApiError::invalid_input(CITY_SYMBOL_MESSAGE))
}
