// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Search, pagination, and keyboard state for a single autocomplete input.
//!
//! The controller never performs I/O. It emits [`AutocompleteEvent::FetchRequested`]
//! and expects the host to run the request and call
//! [`Autocomplete::apply_response`] with the same request id. Time is passed
//! in explicitly so the debounce can be driven by tests.

use std::time::{Duration, Instant};

use crate::{CitySymbol, FetchMode, FetchRequest, FieldKind, Page, Suggestion};

pub const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request was superseded; never surfaced to the user.
    Canceled,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    OpenEmpty,
    OpenLoaded,
    Loading,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutocompleteCommand {
    Input(String),
    Focus,
    Blur,
    Tick,
    SentinelVisible,
    /// The user scrolled the dropdown.
    Scroll,
    MoveDown,
    MoveUp,
    Confirm,
    Pick(usize),
    Dismiss,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutocompleteEvent<T> {
    FetchRequested(FetchRequest),
    FetchCanceled { request_id: u64 },
    Selected(T),
    Cleared,
    FocusReleased,
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    request_id: u64,
    mode: FetchMode,
    page: u32,
    query: String,
}

#[derive(Debug, Clone)]
pub struct Autocomplete<T> {
    field: FieldKind,
    scope: Option<CitySymbol>,
    enabled: bool,
    debounce: Duration,
    search_text: String,
    items: Vec<T>,
    items_query: String,
    items_epoch: u64,
    page: u32,
    has_more: bool,
    open: bool,
    highlighted: Option<usize>,
    search_deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    // Set when a load-more fails; the sentinel stays quiet until the user acts.
    load_more_paused: bool,
    last_request_id: u64,
}

impl<T: Suggestion> Autocomplete<T> {
    /// Creates a controller and, when enabled, arms the debounce for the
    /// empty term so the first page is ready by the time the user opens it.
    pub fn new(field: FieldKind, scope: Option<CitySymbol>, enabled: bool, now: Instant) -> Self {
        let mut controller = Self {
            field,
            scope,
            enabled,
            debounce: DEBOUNCE,
            search_text: String::new(),
            items: Vec::new(),
            items_query: String::new(),
            items_epoch: 0,
            page: 0,
            has_more: false,
            open: false,
            highlighted: None,
            search_deadline: None,
            in_flight: None,
            load_more_paused: false,
            last_request_id: 0,
        };
        controller.arm_search(now);
        controller
    }

    /// A pending search keeps the instant it was armed at.
    pub fn set_debounce(&mut self, debounce: Duration) {
        if let Some(armed) = self
            .search_deadline
            .and_then(|deadline| deadline.checked_sub(self.debounce))
        {
            self.search_deadline = Some(armed + debounce);
        }
        self.debounce = debounce;
    }

    pub fn field(&self) -> FieldKind {
        self.field
    }

    pub fn scope(&self) -> Option<CitySymbol> {
        self.scope
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Bumped whenever the item list is replaced rather than appended to.
    pub fn items_epoch(&self) -> u64 {
        self.items_epoch
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn in_flight_request(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|flight| flight.request_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.search_deadline
    }

    pub fn phase(&self) -> Phase {
        if !self.enabled {
            Phase::Disabled
        } else if self.is_loading() {
            Phase::Loading
        } else if !self.open {
            Phase::Idle
        } else if self.items.is_empty() {
            Phase::OpenEmpty
        } else {
            Phase::OpenLoaded
        }
    }

    /// Whether the dropdown has anything worth drawing.
    pub fn dropdown_visible(&self) -> bool {
        self.open && (!self.search_text.is_empty() || !self.items.is_empty())
    }

    pub fn shows_no_results(&self) -> bool {
        self.items.is_empty() && !self.is_loading() && !self.search_text.is_empty()
    }

    pub fn shows_more_hint(&self) -> bool {
        self.has_more && !self.is_loading()
    }

    pub fn dispatch(
        &mut self,
        command: AutocompleteCommand,
        now: Instant,
    ) -> Vec<AutocompleteEvent<T>> {
        match command {
            AutocompleteCommand::Input(text) => {
                if !self.enabled {
                    return Vec::new();
                }
                self.search_text = text;
                self.open = true;
                self.load_more_paused = false;
                self.arm_search(now);
                Vec::new()
            }
            AutocompleteCommand::Focus => {
                if self.enabled {
                    self.open = true;
                }
                Vec::new()
            }
            AutocompleteCommand::Blur => {
                self.close();
                Vec::new()
            }
            AutocompleteCommand::Tick => match self.search_deadline {
                Some(deadline) if self.enabled && now >= deadline => {
                    self.search_deadline = None;
                    self.start_search()
                }
                _ => Vec::new(),
            },
            AutocompleteCommand::SentinelVisible if self.load_more_paused => Vec::new(),
            AutocompleteCommand::SentinelVisible => self.load_more(),
            AutocompleteCommand::Scroll => {
                self.load_more_paused = false;
                Vec::new()
            }
            AutocompleteCommand::MoveDown => self.move_down(),
            AutocompleteCommand::MoveUp => {
                if self.navigable() {
                    self.highlighted = Some(self.highlighted.map_or(0, |i| i.saturating_sub(1)));
                }
                Vec::new()
            }
            AutocompleteCommand::Confirm => match self.highlighted {
                Some(index) if self.navigable() && index < self.items.len() => self.commit(index),
                _ => Vec::new(),
            },
            AutocompleteCommand::Pick(index) => {
                if self.enabled && index < self.items.len() {
                    self.commit(index)
                } else {
                    Vec::new()
                }
            }
            AutocompleteCommand::Dismiss => {
                self.close();
                vec![AutocompleteEvent::FocusReleased]
            }
            AutocompleteCommand::Clear => self.clear(now),
        }
    }

    /// Applies the outcome of a fetch. Outcomes for anything but the tracked
    /// in-flight request are stale and dropped.
    pub fn apply_response(
        &mut self,
        request_id: u64,
        outcome: Result<Page<T>, FetchFailure>,
    ) -> Vec<AutocompleteEvent<T>> {
        let is_current = self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.request_id == request_id);
        if !is_current {
            log::debug!(
                "{} search: dropping stale response {request_id}",
                self.field.as_str()
            );
            return Vec::new();
        }
        let Some(flight) = self.in_flight.take() else {
            return Vec::new();
        };

        match outcome {
            Ok(page) => {
                match flight.mode {
                    FetchMode::NewSearch => {
                        self.items = page.items;
                        self.items_query = flight.query;
                        self.items_epoch = self.items_epoch.wrapping_add(1);
                        self.page = 0;
                        self.highlighted = None;
                        self.load_more_paused = false;
                    }
                    FetchMode::LoadMore => {
                        let was_on_last = self.highlighted.is_some()
                            && self.highlighted == self.items.len().checked_sub(1);
                        let appended = !page.items.is_empty();
                        self.items.extend(page.items);
                        self.page = flight.page;
                        if was_on_last && appended {
                            self.highlighted = self.highlighted.map(|i| i + 1);
                        }
                    }
                }
                self.has_more = page.has_more;
                Vec::new()
            }
            Err(FetchFailure::Canceled) => Vec::new(),
            Err(FetchFailure::Failed(message)) => {
                if flight.mode == FetchMode::LoadMore {
                    self.load_more_paused = true;
                }
                log::warn!("{} search failed: {message}", self.field.as_str());
                vec![AutocompleteEvent::FetchFailed(message)]
            }
        }
    }

    /// Discards all search state for a new scope. Request ids keep counting
    /// so completions from the previous scope can never match.
    pub fn reset_scope(
        &mut self,
        scope: Option<CitySymbol>,
        enabled: bool,
        now: Instant,
    ) -> Vec<AutocompleteEvent<T>> {
        let events = self.cancel_in_flight();
        self.scope = scope;
        self.enabled = enabled;
        self.search_text.clear();
        self.items.clear();
        self.items_query.clear();
        self.items_epoch = self.items_epoch.wrapping_add(1);
        self.page = 0;
        self.has_more = false;
        self.open = false;
        self.highlighted = None;
        self.search_deadline = None;
        self.load_more_paused = false;
        self.arm_search(now);
        events
    }

    fn navigable(&self) -> bool {
        self.open && !self.items.is_empty()
    }

    fn close(&mut self) {
        self.open = false;
        self.highlighted = None;
    }

    fn arm_search(&mut self, now: Instant) {
        self.search_deadline = self.enabled.then(|| now + self.debounce);
    }

    fn next_request_id(&mut self) -> u64 {
        self.last_request_id = self.last_request_id.wrapping_add(1).max(1);
        self.last_request_id
    }

    fn cancel_in_flight(&mut self) -> Vec<AutocompleteEvent<T>> {
        match self.in_flight.take() {
            Some(flight) => vec![AutocompleteEvent::FetchCanceled {
                request_id: flight.request_id,
            }],
            None => Vec::new(),
        }
    }

    fn start_search(&mut self) -> Vec<AutocompleteEvent<T>> {
        let mut events = self.cancel_in_flight();
        let request_id = self.next_request_id();
        let query = self.search_text.clone();
        events.push(AutocompleteEvent::FetchRequested(self.request(
            request_id,
            &query,
            0,
            FetchMode::NewSearch,
        )));
        self.in_flight = Some(InFlight {
            request_id,
            mode: FetchMode::NewSearch,
            page: 0,
            query,
        });
        events
    }

    fn load_more(&mut self) -> Vec<AutocompleteEvent<T>> {
        if !(self.enabled && self.open && self.has_more && !self.is_loading()) {
            return Vec::new();
        }
        let request_id = self.next_request_id();
        let page = self.page.saturating_add(1);
        let query = self.items_query.clone();
        let request = self.request(request_id, &query, page, FetchMode::LoadMore);
        self.in_flight = Some(InFlight {
            request_id,
            mode: FetchMode::LoadMore,
            page,
            query,
        });
        vec![AutocompleteEvent::FetchRequested(request)]
    }

    fn move_down(&mut self) -> Vec<AutocompleteEvent<T>> {
        if !self.navigable() {
            return Vec::new();
        }
        let last = self.items.len() - 1;
        match self.highlighted {
            None => {
                self.highlighted = Some(0);
                Vec::new()
            }
            Some(index) if index < last => {
                self.highlighted = Some(index + 1);
                Vec::new()
            }
            Some(_) => {
                self.load_more_paused = false;
                self.load_more()
            }
        }
    }

    fn commit(&mut self, index: usize) -> Vec<AutocompleteEvent<T>> {
        let item = self.items[index].clone();
        self.search_text = item.label().to_owned();
        self.close();
        self.search_deadline = None;
        let mut events = self.cancel_in_flight();
        events.push(AutocompleteEvent::Selected(item));
        events
    }

    fn clear(&mut self, now: Instant) -> Vec<AutocompleteEvent<T>> {
        let mut events = self.cancel_in_flight();
        self.search_text.clear();
        self.items.clear();
        self.items_query.clear();
        self.items_epoch = self.items_epoch.wrapping_add(1);
        self.page = 0;
        self.has_more = false;
        self.load_more_paused = false;
        self.close();
        self.arm_search(now);
        events.push(AutocompleteEvent::Cleared);
        events
    }

    fn request(&self, request_id: u64, query: &str, page: u32, mode: FetchMode) -> FetchRequest {
        log::debug!(
            "{} search #{request_id}: {query:?} page {page} ({mode:?})",
            self.field.as_str()
        );
        FetchRequest {
            request_id,
            field: self.field,
            scope: self.scope,
            search: query.to_owned(),
            page,
            mode,
        }
    }
}
