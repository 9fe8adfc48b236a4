// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::{
    Autocomplete, AutocompleteCommand, AutocompleteEvent, City, DEBOUNCE, FetchFailure,
    FetchRequest, FieldKind, SearchResponse, Street, Suggestion,
};

/// Confirmed city and street. The street is only meaningful under the city it
/// was fetched for, so any change of city drops it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    city: Option<City>,
    street: Option<Street>,
}

impl Selection {
    pub fn city(&self) -> Option<&City> {
        self.city.as_ref()
    }

    pub fn street(&self) -> Option<&Street> {
        self.street.as_ref()
    }

    /// Returns true when the city key changed, which invalidates the street
    /// search scope.
    pub fn confirm_city(&mut self, city: Option<City>) -> bool {
        let previous = self.city.as_ref().map(|c| c.city_symbol);
        let next = city.as_ref().map(|c| c.city_symbol);
        let changed = previous != next;
        if changed || next.is_none() {
            self.street = None;
        }
        self.city = city;
        changed
    }

    /// Ignored while no city is confirmed.
    pub fn confirm_street(&mut self, street: Option<Street>) -> bool {
        if self.city.is_none() {
            return false;
        }
        self.street = street;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressCommand {
    /// Forwarded to the focused field.
    Field(AutocompleteCommand),
    FocusField(FieldKind),
    FocusNext,
    FocusPrev,
    ReleaseFocus,
    SentinelVisible(FieldKind),
    Tick,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressEvent {
    Fetch(FetchRequest),
    Cancel { field: FieldKind, request_id: u64 },
    CityChanged(Option<City>),
    StreetChanged(Option<Street>),
    FocusChanged(Option<FieldKind>),
    StatusUpdated(String),
    StatusCleared,
}

/// The two coupled lookups plus the confirmed selection.
#[derive(Debug, Clone)]
pub struct AddressSearch {
    city: Autocomplete<City>,
    street: Autocomplete<Street>,
    selection: Selection,
    focus: Option<FieldKind>,
    status_line: Option<String>,
}

impl AddressSearch {
    pub fn new(now: Instant) -> Self {
        Self::with_debounce(now, DEBOUNCE)
    }

    pub fn with_debounce(now: Instant, debounce: Duration) -> Self {
        let mut city = Autocomplete::new(FieldKind::City, None, true, now);
        let mut street = Autocomplete::new(FieldKind::Street, None, false, now);
        city.set_debounce(debounce);
        street.set_debounce(debounce);
        Self {
            city,
            street,
            selection: Selection::default(),
            focus: None,
            status_line: None,
        }
    }

    pub fn city(&self) -> &Autocomplete<City> {
        &self.city
    }

    pub fn street(&self) -> &Autocomplete<Street> {
        &self.street
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn focus(&self) -> Option<FieldKind> {
        self.focus
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    /// Earliest pending debounce deadline across both fields.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.city.next_deadline(), self.street.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_focusable(&self, field: FieldKind) -> bool {
        match field {
            FieldKind::City => self.city.is_enabled(),
            FieldKind::Street => self.street.is_enabled(),
        }
    }

    pub fn dispatch(&mut self, command: AddressCommand, now: Instant) -> Vec<AddressEvent> {
        match command {
            AddressCommand::Field(command) => match self.focus {
                Some(FieldKind::City) => {
                    let events = self.city.dispatch(command, now);
                    self.route_city(events, now)
                }
                Some(FieldKind::Street) => {
                    let events = self.street.dispatch(command, now);
                    self.route_street(events)
                }
                None => Vec::new(),
            },
            AddressCommand::FocusField(field) => self.set_focus(Some(field), now),
            AddressCommand::FocusNext => self.rotate_focus(1, now),
            AddressCommand::FocusPrev => self.rotate_focus(-1, now),
            AddressCommand::ReleaseFocus => self.set_focus(None, now),
            AddressCommand::SentinelVisible(FieldKind::City) => {
                let events = self.city.dispatch(AutocompleteCommand::SentinelVisible, now);
                self.route_city(events, now)
            }
            AddressCommand::SentinelVisible(FieldKind::Street) => {
                let events = self.street.dispatch(AutocompleteCommand::SentinelVisible, now);
                self.route_street(events)
            }
            AddressCommand::Tick => {
                let city_events = self.city.dispatch(AutocompleteCommand::Tick, now);
                let mut events = self.route_city(city_events, now);
                let street_events = self.street.dispatch(AutocompleteCommand::Tick, now);
                events.extend(self.route_street(street_events));
                events
            }
            AddressCommand::ClearStatus => {
                self.status_line = None;
                vec![AddressEvent::StatusCleared]
            }
        }
    }

    /// Routes a completed fetch to the field that issued it.
    pub fn apply_response(
        &mut self,
        field: FieldKind,
        request_id: u64,
        outcome: Result<SearchResponse, FetchFailure>,
        now: Instant,
    ) -> Vec<AddressEvent> {
        match (field, outcome) {
            (FieldKind::City, Ok(SearchResponse::Cities(page))) => {
                let events = self.city.apply_response(request_id, Ok(page));
                self.route_city(events, now)
            }
            (FieldKind::Street, Ok(SearchResponse::Streets(page))) => {
                let events = self.street.apply_response(request_id, Ok(page));
                self.route_street(events)
            }
            (field, Ok(other)) => {
                let message = format!(
                    "{} search returned {} results",
                    field.as_str(),
                    other.field().as_str()
                );
                self.apply_failure(field, request_id, FetchFailure::Failed(message), now)
            }
            (field, Err(failure)) => self.apply_failure(field, request_id, failure, now),
        }
    }

    fn apply_failure(
        &mut self,
        field: FieldKind,
        request_id: u64,
        failure: FetchFailure,
        now: Instant,
    ) -> Vec<AddressEvent> {
        match field {
            FieldKind::City => {
                let events = self.city.apply_response(request_id, Err(failure));
                self.route_city(events, now)
            }
            FieldKind::Street => {
                let events = self.street.apply_response(request_id, Err(failure));
                self.route_street(events)
            }
        }
    }

    fn set_focus(&mut self, target: Option<FieldKind>, now: Instant) -> Vec<AddressEvent> {
        let target = target.filter(|field| self.is_focusable(*field));
        if target == self.focus {
            return Vec::new();
        }
        if let Some(previous) = self.focus {
            match previous {
                FieldKind::City => {
                    self.city.dispatch(AutocompleteCommand::Blur, now);
                }
                FieldKind::Street => {
                    self.street.dispatch(AutocompleteCommand::Blur, now);
                }
            }
        }
        match target {
            Some(FieldKind::City) => {
                self.city.dispatch(AutocompleteCommand::Focus, now);
            }
            Some(FieldKind::Street) => {
                self.street.dispatch(AutocompleteCommand::Focus, now);
            }
            None => {}
        }
        self.focus = target;
        vec![AddressEvent::FocusChanged(target)]
    }

    fn rotate_focus(&mut self, delta: isize, now: Instant) -> Vec<AddressEvent> {
        let fields: Vec<FieldKind> = FieldKind::ALL
            .into_iter()
            .filter(|field| self.is_focusable(*field))
            .collect();
        if fields.is_empty() {
            return Vec::new();
        }
        let len = fields.len() as isize;
        let next = match self.focus.and_then(|f| fields.iter().position(|x| *x == f)) {
            Some(current) => (current as isize + delta).rem_euclid(len) as usize,
            None if delta >= 0 => 0,
            None => fields.len() - 1,
        };
        self.set_focus(Some(fields[next]), now)
    }

    fn route_city(
        &mut self,
        events: Vec<AutocompleteEvent<City>>,
        now: Instant,
    ) -> Vec<AddressEvent> {
        let mut out = Vec::new();
        for event in events {
            match event {
                AutocompleteEvent::Selected(city) => self.change_city(Some(city), now, &mut out),
                AutocompleteEvent::Cleared => self.change_city(None, now, &mut out),
                other => self.route_common(FieldKind::City, other, &mut out),
            }
        }
        out
    }

    fn route_street(&mut self, events: Vec<AutocompleteEvent<Street>>) -> Vec<AddressEvent> {
        let mut out = Vec::new();
        for event in events {
            match event {
                AutocompleteEvent::Selected(street) => {
                    if self.selection.confirm_street(Some(street.clone())) {
                        out.push(AddressEvent::StreetChanged(Some(street)));
                    }
                }
                AutocompleteEvent::Cleared => {
                    if self.selection.confirm_street(None) {
                        out.push(AddressEvent::StreetChanged(None));
                    }
                }
                other => self.route_common(FieldKind::Street, other, &mut out),
            }
        }
        out
    }

    fn route_common<T: Suggestion>(
        &mut self,
        field: FieldKind,
        event: AutocompleteEvent<T>,
        out: &mut Vec<AddressEvent>,
    ) {
        match event {
            AutocompleteEvent::FetchRequested(request) => out.push(AddressEvent::Fetch(request)),
            AutocompleteEvent::FetchCanceled { request_id } => {
                out.push(AddressEvent::Cancel { field, request_id });
            }
            AutocompleteEvent::FocusReleased => {
                self.focus = None;
                out.push(AddressEvent::FocusChanged(None));
            }
            AutocompleteEvent::FetchFailed(message) => {
                let status = format!("{} search failed: {message}", field.as_str());
                self.status_line = Some(status.clone());
                out.push(AddressEvent::StatusUpdated(status));
            }
            AutocompleteEvent::Selected(_) | AutocompleteEvent::Cleared => {}
        }
    }

    /// The single place where a city change cascades into the street field.
    fn change_city(&mut self, city: Option<City>, now: Instant, out: &mut Vec<AddressEvent>) {
        let had_street = self.selection.street().is_some();
        let scope = city.as_ref().map(|c| c.city_symbol);
        let changed = self.selection.confirm_city(city.clone());
        if !changed {
            return;
        }
        let canceled = self.street.reset_scope(scope, scope.is_some(), now);
        for event in canceled {
            self.route_common(FieldKind::Street, event, out);
        }
        if self.focus == Some(FieldKind::Street) && scope.is_none() {
            self.focus = None;
            out.push(AddressEvent::FocusChanged(None));
        }
        out.push(AddressEvent::CityChanged(city));
        if had_street {
            out.push(AddressEvent::StreetChanged(None));
        }
    }
}
