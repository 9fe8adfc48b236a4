// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use ktovet_app::{AddressDirectory, City, CitySymbol, Page, Street};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking client for a running `ktovet --serve` instance.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("client.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("client.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "client.base_url must use http or https, got {:?}",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        let mut params = Vec::with_capacity(2);
        push_search(&mut params, search);
        params.push(("page", page.to_string()));
        self.get_json("/cities", &params)
            .with_context(|| format!("fetch cities matching {search:?} (page {page})"))
    }

    /// Without a city there is nothing to ask the server.
    pub fn fetch_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        let Some(city) = city else {
            return Ok(Page::empty());
        };
        let mut params = Vec::with_capacity(3);
        params.push(("citySymbol", city.to_string()));
        push_search(&mut params, search);
        params.push(("page", page.to_string()));
        self.get_json("/streets", &params).with_context(|| {
            format!("fetch streets of city {city} matching {search:?} (page {page})")
        })
    }

    pub fn health(&self) -> Result<()> {
        let status: HealthResponse = self.get_json("/health", &[])?;
        if status.status != "ok" {
            bail!("server reported status {:?}", status.status);
        }
        Ok(())
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .with_context(|| format!("build URL for {path}"))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path, params)?;
        log::debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        response
            .json()
            .with_context(|| format!("decode {path} response"))
    }
}

impl AddressDirectory for Client {
    fn search_cities(&self, search: &str, page: u32) -> Result<Page<City>> {
        self.fetch_cities(search, page)
    }

    fn search_streets(
        &self,
        city: Option<CitySymbol>,
        search: &str,
        page: u32,
    ) -> Result<Page<Street>> {
        self.fetch_streets(city, search, page)
    }

    fn ping(&self) -> Result<()> {
        self.health()
    }
}

fn push_search(params: &mut Vec<(&'static str, String)>, search: &str) {
    if !search.trim().is_empty() {
        params.push(("search", search.to_owned()));
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!(
            "{base_url} did not answer in time -- raise [client] timeout in the config ({error})"
        );
    }
    anyhow!("cannot reach {base_url} -- start it with `ktovet --serve` ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && !parsed.message.is_empty()
    {
        return anyhow!(
            "server error ({}): {}: {}",
            status.as_u16(),
            parsed.error,
            parsed.message
        );
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}
