// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ktovet_app::{
    AddressCommand, AddressEvent, AddressSearch, Autocomplete, AutocompleteCommand, FetchFailure,
    FetchRequest, FieldKind, SearchResponse, Suggestion,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

const DROPDOWN_ROWS: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const KEY_HINTS: &str =
    "tab focus · ↑/↓ move · enter pick · esc close · ctrl-u clear · pgup/pgdn scroll · q quit";

/// Executes the fetches the search controllers ask for.
pub trait SearchRuntime {
    fn run_search(&mut self, request: &FetchRequest) -> Result<SearchResponse>;

    /// Runs the request and reports back on `tx`. The default runs inline,
    /// which is enough for tests; real runtimes move the work off the UI
    /// thread.
    fn spawn_search(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let outcome = self
            .run_search(&request)
            .map_err(|error| FetchFailure::Failed(format!("{error:#}")));
        tx.send(InternalEvent::SearchCompleted {
            field: request.field,
            request_id: request.request_id,
            outcome,
        })
        .map_err(|_| anyhow::anyhow!("search event channel closed"))?;
        Ok(())
    }

    fn cancel_search(&mut self, _field: FieldKind, _request_id: u64) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    SearchCompleted {
        field: FieldKind,
        request_id: u64,
        outcome: Result<SearchResponse, FetchFailure>,
    },
}

/// Scroll window over one dropdown. The row just past the last loaded item
/// is the load-more sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DropdownViewport {
    offset: usize,
    height: usize,
    epoch: u64,
    last_highlight: Option<usize>,
}

impl Default for DropdownViewport {
    fn default() -> Self {
        Self {
            offset: 0,
            height: DROPDOWN_ROWS,
            epoch: 0,
            last_highlight: None,
        }
    }
}

impl DropdownViewport {
    fn max_offset(&self, len: usize) -> usize {
        (len + 1).saturating_sub(self.height)
    }

    /// Follows list replacement and highlight movement. Manual scrolling is
    /// left alone until the highlight moves again.
    fn sync(&mut self, len: usize, highlighted: Option<usize>, epoch: u64) {
        if epoch != self.epoch {
            self.epoch = epoch;
            self.offset = 0;
        }
        if highlighted != self.last_highlight {
            self.last_highlight = highlighted;
            if let Some(index) = highlighted {
                if index < self.offset {
                    self.offset = index;
                } else if index >= self.offset + self.height {
                    self.offset = index + 1 - self.height;
                }
            }
        }
        self.offset = self.offset.min(self.max_offset(len));
    }

    fn scroll(&mut self, delta: isize, len: usize) {
        let target = self.offset.saturating_add_signed(delta);
        self.offset = target.min(self.max_offset(len));
    }

    fn sentinel_visible(&self, len: usize) -> bool {
        self.offset + self.height > len
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    city_viewport: DropdownViewport,
    street_viewport: DropdownViewport,
    status_token: u64,
}

impl ViewData {
    fn viewport(&self, field: FieldKind) -> &DropdownViewport {
        match field {
            FieldKind::City => &self.city_viewport,
            FieldKind::Street => &self.street_viewport,
        }
    }

    fn viewport_mut(&mut self, field: FieldKind) -> &mut DropdownViewport {
        match field {
            FieldKind::City => &mut self.city_viewport,
            FieldKind::Street => &mut self.street_viewport,
        }
    }
}

pub fn run_app<R: SearchRuntime>(search: &mut AddressSearch, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result = Ok(());
    loop {
        step(
            search,
            runtime,
            &mut view_data,
            &internal_tx,
            &internal_rx,
            Instant::now(),
        );

        if let Err(error) = terminal.draw(|frame| render(frame, search, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(POLL_INTERVAL).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                    if handle_key_event(
                        search,
                        runtime,
                        &mut view_data,
                        &internal_tx,
                        key,
                        Instant::now(),
                    ) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// One pass of the UI loop minus drawing and input.
fn step<R: SearchRuntime>(
    search: &mut AddressSearch,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
    now: Instant,
) {
    process_internal_events(search, runtime, view_data, tx, rx, now);

    let events = search.dispatch(AddressCommand::Tick, now);
    handle_address_events(runtime, view_data, tx, events);

    sync_viewports(search, view_data);
    if let Some(field) = search.focus()
        && sentinel_reached(search, view_data, field)
    {
        let events = search.dispatch(AddressCommand::SentinelVisible(field), now);
        handle_address_events(runtime, view_data, tx, events);
    }
}

fn process_internal_events<R: SearchRuntime>(
    search: &mut AddressSearch,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
    now: Instant,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                search.dispatch(AddressCommand::ClearStatus, now);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::SearchCompleted {
                field,
                request_id,
                outcome,
            } => {
                let events = search.apply_response(field, request_id, outcome, now);
                handle_address_events(runtime, view_data, tx, events);
            }
        }
    }
}

fn handle_address_events<R: SearchRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<AddressEvent>,
) {
    for event in events {
        match event {
            AddressEvent::Fetch(request) => {
                let field = request.field;
                let request_id = request.request_id;
                if let Err(error) = runtime.spawn_search(request, tx.clone()) {
                    log::warn!("{} search #{request_id} not started: {error:#}", field.as_str());
                    let _ = tx.send(InternalEvent::SearchCompleted {
                        field,
                        request_id,
                        outcome: Err(FetchFailure::Failed(error.to_string())),
                    });
                }
            }
            AddressEvent::Cancel { field, request_id } => {
                if let Err(error) = runtime.cancel_search(field, request_id) {
                    log::warn!("cancel {} search #{request_id}: {error:#}", field.as_str());
                }
            }
            AddressEvent::CityChanged(city) => match city {
                Some(city) => log::info!("city set to {} ({})", city.city_name, city.city_symbol),
                None => log::info!("city cleared"),
            },
            AddressEvent::StreetChanged(street) => match street {
                Some(street) => {
                    log::info!("street set to {} ({})", street.street_name, street.street_symbol);
                }
                None => log::info!("street cleared"),
            },
            AddressEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(tx, view_data.status_token);
            }
            AddressEvent::FocusChanged(_) | AddressEvent::StatusCleared => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn sync_viewports(search: &AddressSearch, view_data: &mut ViewData) {
    let city = search.city();
    view_data
        .city_viewport
        .sync(city.items().len(), city.highlighted(), city.items_epoch());
    let street = search.street();
    view_data
        .street_viewport
        .sync(street.items().len(), street.highlighted(), street.items_epoch());
}

fn sentinel_reached(search: &AddressSearch, view_data: &ViewData, field: FieldKind) -> bool {
    let viewport = view_data.viewport(field);
    match field {
        FieldKind::City => field_sentinel_reached(search.city(), viewport),
        FieldKind::Street => field_sentinel_reached(search.street(), viewport),
    }
}

fn field_sentinel_reached<T: Suggestion>(
    field: &Autocomplete<T>,
    viewport: &DropdownViewport,
) -> bool {
    field.dropdown_visible()
        && field.shows_more_hint()
        && viewport.sentinel_visible(field.items().len())
}

fn focused_text(search: &AddressSearch, field: FieldKind) -> &str {
    match field {
        FieldKind::City => search.city().search_text(),
        FieldKind::Street => search.street().search_text(),
    }
}

fn focused_is_open(search: &AddressSearch, field: FieldKind) -> bool {
    match field {
        FieldKind::City => search.city().is_open(),
        FieldKind::Street => search.street().is_open(),
    }
}

fn focused_len(search: &AddressSearch, field: FieldKind) -> usize {
    match field {
        FieldKind::City => search.city().items().len(),
        FieldKind::Street => search.street().items().len(),
    }
}

fn handle_key_event<R: SearchRuntime>(
    search: &mut AddressSearch,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    let Some(field) = search.focus() else {
        let command = match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Tab | KeyCode::Enter | KeyCode::Down => Some(AddressCommand::FocusNext),
            KeyCode::BackTab | KeyCode::Up => Some(AddressCommand::FocusPrev),
            KeyCode::Char('c') => Some(AddressCommand::FocusField(FieldKind::City)),
            KeyCode::Char('s') => Some(AddressCommand::FocusField(FieldKind::Street)),
            _ => None,
        };
        if let Some(command) = command {
            let events = search.dispatch(command, now);
            handle_address_events(runtime, view_data, internal_tx, events);
        }
        return false;
    };

    let command = match key.code {
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(AddressCommand::Field(AutocompleteCommand::Clear))
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let mut text = focused_text(search, field).to_owned();
            text.push(ch);
            Some(AddressCommand::Field(AutocompleteCommand::Input(text)))
        }
        KeyCode::Backspace => {
            let mut text = focused_text(search, field).to_owned();
            text.pop().map(|_| AddressCommand::Field(AutocompleteCommand::Input(text)))
        }
        KeyCode::Down => {
            if !focused_is_open(search, field) {
                search.dispatch(AddressCommand::Field(AutocompleteCommand::Focus), now);
            }
            Some(AddressCommand::Field(AutocompleteCommand::MoveDown))
        }
        KeyCode::Up => Some(AddressCommand::Field(AutocompleteCommand::MoveUp)),
        KeyCode::Enter => Some(AddressCommand::Field(AutocompleteCommand::Confirm)),
        KeyCode::Esc => Some(AddressCommand::Field(AutocompleteCommand::Dismiss)),
        KeyCode::Tab => Some(AddressCommand::FocusNext),
        KeyCode::BackTab => Some(AddressCommand::FocusPrev),
        KeyCode::PageDown | KeyCode::PageUp => {
            let len = focused_len(search, field);
            let delta = DROPDOWN_ROWS as isize;
            let delta = if key.code == KeyCode::PageDown { delta } else { -delta };
            view_data.viewport_mut(field).scroll(delta, len);
            Some(AddressCommand::Field(AutocompleteCommand::Scroll))
        }
        _ => None,
    };

    if let Some(command) = command {
        let events = search.dispatch(command, now);
        handle_address_events(runtime, view_data, internal_tx, events);
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DropdownRow {
    Item {
        label: String,
        key: i64,
        highlighted: bool,
    },
    Searching,
    MoreHint,
    NoResults,
}

fn dropdown_rows<T: Suggestion>(
    field: &Autocomplete<T>,
    viewport: &DropdownViewport,
) -> Vec<DropdownRow> {
    if !field.dropdown_visible() {
        return Vec::new();
    }
    if field.shows_no_results() {
        return vec![DropdownRow::NoResults];
    }
    if field.items().is_empty() {
        return if field.is_loading() {
            vec![DropdownRow::Searching]
        } else {
            Vec::new()
        };
    }

    let mut rows: Vec<DropdownRow> = field
        .items()
        .iter()
        .enumerate()
        .skip(viewport.offset)
        .take(viewport.height)
        .map(|(index, item)| DropdownRow::Item {
            label: item.label().to_owned(),
            key: item.key(),
            highlighted: field.highlighted() == Some(index),
        })
        .collect();
    if rows.len() < viewport.height && field.shows_more_hint() {
        rows.push(DropdownRow::MoreHint);
    }
    rows
}

fn dropdown_line(row: &DropdownRow) -> Line<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    match row {
        DropdownRow::Item {
            label,
            key,
            highlighted,
        } => {
            let line = Line::from(vec![
                Span::raw(label.clone()),
                Span::raw("  "),
                Span::styled(format!("#{key}"), dim.add_modifier(Modifier::DIM)),
            ]);
            if *highlighted {
                line.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                line
            }
        }
        DropdownRow::Searching => Line::styled("searching…", dim),
        DropdownRow::MoreHint => Line::styled("loading more…", dim),
        DropdownRow::NoResults => Line::styled("no results found", dim),
    }
}

fn input_title<T: Suggestion>(field: &Autocomplete<T>) -> String {
    if field.is_loading() {
        format!("{} …", field.field().label())
    } else {
        field.field().label().to_owned()
    }
}

fn input_line<T: Suggestion>(field: &Autocomplete<T>, focused: bool) -> Line<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    if !field.is_enabled() {
        return Line::styled("choose a city first", dim);
    }
    if field.search_text().is_empty() {
        return Line::styled(field.field().placeholder(), dim);
    }
    let mut text = field.search_text().to_owned();
    if focused {
        text.push('▏');
    }
    Line::raw(text)
}

fn render_input<T: Suggestion>(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    field: &Autocomplete<T>,
    focused: bool,
) {
    let border = if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else if field.is_enabled() {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let widget = Paragraph::new(input_line(field, focused)).block(
        Block::default()
            .title(input_title(field))
            .borders(Borders::ALL)
            .border_style(border),
    );
    frame.render_widget(widget, area);
}

fn render_dropdown<T: Suggestion>(
    frame: &mut ratatui::Frame<'_>,
    anchor: Rect,
    field: &Autocomplete<T>,
    viewport: &DropdownViewport,
) {
    let rows = dropdown_rows(field, viewport);
    if rows.is_empty() {
        return;
    }
    let screen = frame.area();
    let top = anchor.y.saturating_add(anchor.height);
    let wanted = u16::try_from(rows.len() + 2).unwrap_or(u16::MAX);
    let height = wanted.min(screen.bottom().saturating_sub(top));
    if height < 3 {
        return;
    }
    let area = Rect {
        x: anchor.x,
        y: top,
        width: anchor.width,
        height,
    };
    frame.render_widget(Clear, area);
    let lines: Vec<Line<'static>> = rows.iter().map(dropdown_line).collect();
    let dropdown = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(dropdown, area);
}

fn selection_text(search: &AddressSearch) -> String {
    let selection = search.selection();
    let city = selection.city().map_or_else(
        || "please choose a city…".to_owned(),
        |city| format!("{} (#{})", city.city_name, city.city_symbol),
    );
    let street = selection.street().map_or_else(
        || "please choose a street…".to_owned(),
        |street| format!("{} (#{})", street.street_name, street.street_symbol),
    );
    format!("city:   {city}\nstreet: {street}")
}

fn status_text(search: &AddressSearch) -> &str {
    search.status_line().unwrap_or(KEY_HINTS)
}

fn render(frame: &mut ratatui::Frame<'_>, search: &AddressSearch, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let title = Paragraph::new("address lookup")
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().title("ktovet").borders(Borders::ALL));
    frame.render_widget(title, layout[0]);

    let focus = search.focus();
    render_input(
        frame,
        layout[1],
        search.city(),
        focus == Some(FieldKind::City),
    );
    render_input(
        frame,
        layout[2],
        search.street(),
        focus == Some(FieldKind::Street),
    );

    let selection = Paragraph::new(selection_text(search))
        .block(Block::default().title("selection").borders(Borders::ALL));
    frame.render_widget(selection, layout[3]);

    let status = Paragraph::new(status_text(search))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[5]);

    match focus {
        Some(FieldKind::City) => render_dropdown(
            frame,
            layout[1],
            search.city(),
            view_data.viewport(FieldKind::City),
        ),
        Some(FieldKind::Street) => render_dropdown(
            frame,
            layout[2],
            search.street(),
            view_data.viewport(FieldKind::Street),
        ),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DropdownRow, DropdownViewport, InternalEvent, SearchRuntime, ViewData, dropdown_rows,
        handle_key_event, render, selection_text, status_text, step,
    };
    use anyhow::{Result, bail};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ktovet_app::{
        AddressSearch, City, CitySymbol, DEBOUNCE, FetchFailure, FetchMode, FetchRequest,
        FieldKind, PAGE_SIZE, Page, SearchResponse, Street, StreetSymbol,
    };
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::{Duration, Instant};

    #[derive(Debug, Default)]
    struct TestRuntime {
        cities: Vec<City>,
        streets: Vec<(CitySymbol, Street)>,
        requests: Vec<FetchRequest>,
        canceled: Vec<(FieldKind, u64)>,
        fail_with: Option<String>,
        hold: bool,
        held: Vec<FetchRequest>,
    }

    impl TestRuntime {
        fn with_fixture() -> Self {
            let mut cities: Vec<City> = (0..25)
                .map(|i| city(100 + i, &format!("תל אביב {i:02}")))
                .collect();
            cities.push(city(3000, "ירושלים"));
            cities.push(city(4000, "חיפה"));
            let streets = vec![
                (CitySymbol::new(100), street(101, "אלנבי")),
                (CitySymbol::new(100), street(203, "דיזנגוף")),
                (CitySymbol::new(100), street(112, "הרצל")),
                (CitySymbol::new(3000), street(112, "יפו")),
            ];
            Self {
                cities,
                streets,
                ..Self::default()
            }
        }
    }

    impl SearchRuntime for TestRuntime {
        fn run_search(&mut self, request: &FetchRequest) -> Result<SearchResponse> {
            self.requests.push(request.clone());
            if let Some(message) = &self.fail_with {
                bail!("{message}");
            }
            let needle = request.search.trim().to_lowercase();
            let offset = request.page as usize * PAGE_SIZE;
            match request.field {
                FieldKind::City => {
                    let rows = self
                        .cities
                        .iter()
                        .filter(|c| c.city_name.to_lowercase().contains(&needle))
                        .skip(offset)
                        .take(PAGE_SIZE + 1)
                        .cloned()
                        .collect();
                    Ok(SearchResponse::Cities(Page::from_probe(rows, PAGE_SIZE)))
                }
                FieldKind::Street => {
                    let rows = self
                        .streets
                        .iter()
                        .filter(|(scope, _)| Some(*scope) == request.scope)
                        .map(|(_, s)| s)
                        .filter(|s| s.street_name.to_lowercase().contains(&needle))
                        .skip(offset)
                        .take(PAGE_SIZE + 1)
                        .cloned()
                        .collect();
                    Ok(SearchResponse::Streets(Page::from_probe(rows, PAGE_SIZE)))
                }
            }
        }

        fn spawn_search(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
            if self.hold {
                self.held.push(request);
                return Ok(());
            }
            let outcome = self
                .run_search(&request)
                .map_err(|error| FetchFailure::Failed(error.to_string()));
            tx.send(InternalEvent::SearchCompleted {
                field: request.field,
                request_id: request.request_id,
                outcome,
            })?;
            Ok(())
        }

        fn cancel_search(&mut self, field: FieldKind, request_id: u64) -> Result<()> {
            self.canceled.push((field, request_id));
            Ok(())
        }
    }

    fn city(symbol: i64, name: &str) -> City {
        City {
            city_symbol: CitySymbol::new(symbol),
            city_name: name.to_owned(),
        }
    }

    fn street(symbol: i64, name: &str) -> Street {
        Street {
            street_symbol: StreetSymbol::new(symbol),
            street_name: name.to_owned(),
        }
    }

    struct Harness {
        search: AddressSearch,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: Sender<InternalEvent>,
        rx: Receiver<InternalEvent>,
        now: Instant,
    }

    impl Harness {
        fn new(runtime: TestRuntime) -> Self {
            let now = Instant::now();
            let (tx, rx) = mpsc::channel();
            Self {
                search: AddressSearch::new(now),
                runtime,
                view_data: ViewData::default(),
                tx,
                rx,
                now,
            }
        }

        fn key(&mut self, code: KeyCode) -> bool {
            self.key_with(code, KeyModifiers::NONE)
        }

        fn key_with(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
            handle_key_event(
                &mut self.search,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                KeyEvent::new(code, modifiers),
                self.now,
            )
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.key(KeyCode::Char(ch));
            }
        }

        fn advance(&mut self, by: Duration) {
            self.now += by;
            self.step();
        }

        /// Lets pending debounces fire and their results land.
        fn settle(&mut self) {
            self.advance(DEBOUNCE);
            self.step();
        }

        /// Completes a held request, in whatever order the test chooses.
        fn deliver(&mut self, request: &FetchRequest) {
            let outcome = self
                .runtime
                .run_search(request)
                .map_err(|error| FetchFailure::Failed(error.to_string()));
            self.tx
                .send(InternalEvent::SearchCompleted {
                    field: request.field,
                    request_id: request.request_id,
                    outcome,
                })
                .expect("send completion");
            self.step();
        }

        fn step(&mut self) {
            step(
                &mut self.search,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
                self.now,
            );
        }
    }

    #[test]
    fn prefetch_loads_first_city_page() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.settle();

        assert_eq!(harness.runtime.requests.len(), 1);
        let request = &harness.runtime.requests[0];
        assert_eq!(request.field, FieldKind::City);
        assert_eq!(request.search, "");
        assert_eq!(request.mode, FetchMode::NewSearch);
        assert_eq!(harness.search.city().items().len(), PAGE_SIZE);
        assert!(harness.search.city().has_more());
        assert!(harness.search.street().items().is_empty());
    }

    #[test]
    fn typing_fetches_once_after_debounce() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.settle();
        harness.runtime.requests.clear();

        harness.key(KeyCode::Tab);
        assert_eq!(harness.search.focus(), Some(FieldKind::City));
        harness.type_text("ירו");
        harness.advance(Duration::from_millis(100));
        harness.type_text("ש");
        harness.advance(Duration::from_millis(200));
        assert!(harness.runtime.requests.is_empty());

        harness.settle();
        let searches: Vec<&str> = harness
            .runtime
            .requests
            .iter()
            .map(|r| r.search.as_str())
            .collect();
        assert_eq!(searches, vec!["ירוש"]);
        assert_eq!(harness.search.city().items().len(), 1);
    }

    #[test]
    fn confirming_city_enables_street_lookup() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.type_text("ירושלים");
        harness.settle();

        harness.key(KeyCode::Down);
        harness.key(KeyCode::Enter);
        assert_eq!(
            harness.search.selection().city().map(|c| c.city_symbol),
            Some(CitySymbol::new(3000))
        );
        assert!(harness.search.street().is_enabled());

        harness.key(KeyCode::Tab);
        assert_eq!(harness.search.focus(), Some(FieldKind::Street));
        harness.settle();
        let last = harness.runtime.requests.last().expect("street request");
        assert_eq!(last.field, FieldKind::Street);
        assert_eq!(last.scope, Some(CitySymbol::new(3000)));

        harness.key(KeyCode::Down);
        harness.key(KeyCode::Enter);
        assert_eq!(
            harness.search.selection().street().map(|s| s.street_name.as_str()),
            Some("יפו")
        );
    }

    #[test]
    fn clearing_city_drops_street() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.type_text("ירושלים");
        harness.settle();
        harness.key(KeyCode::Down);
        harness.key(KeyCode::Enter);
        harness.key(KeyCode::Tab);
        harness.settle();
        harness.key(KeyCode::Down);
        harness.key(KeyCode::Enter);
        assert!(harness.search.selection().street().is_some());

        harness.key(KeyCode::BackTab);
        assert_eq!(harness.search.focus(), Some(FieldKind::City));
        harness.key_with(KeyCode::Char('u'), KeyModifiers::CONTROL);

        assert!(harness.search.selection().city().is_none());
        assert!(harness.search.selection().street().is_none());
        assert!(!harness.search.street().is_enabled());
        assert_eq!(harness.search.city().search_text(), "");
    }

    #[test]
    fn page_down_to_sentinel_loads_next_page() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.type_text("תל אב");
        harness.settle();
        assert_eq!(harness.search.city().items().len(), PAGE_SIZE);
        harness.runtime.requests.clear();

        harness.key(KeyCode::PageDown);
        harness.step();
        assert!(harness.runtime.requests.is_empty());

        harness.key(KeyCode::PageDown);
        harness.key(KeyCode::PageDown);
        harness.step();
        assert_eq!(harness.runtime.requests.len(), 1);
        let request = &harness.runtime.requests[0];
        assert_eq!(request.mode, FetchMode::LoadMore);
        assert_eq!(request.page, 1);
        assert_eq!(request.search, "תל אב");

        harness.step();
        assert_eq!(harness.search.city().items().len(), 25);
        assert!(!harness.search.city().has_more());
        harness.step();
        assert_eq!(harness.runtime.requests.len(), 1);
    }

    #[test]
    fn down_past_last_item_loads_more() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.type_text("תל אב");
        harness.settle();
        harness.runtime.requests.clear();

        for _ in 0..PAGE_SIZE {
            harness.key(KeyCode::Down);
        }
        assert_eq!(harness.search.city().highlighted(), Some(PAGE_SIZE - 1));
        assert!(harness.runtime.requests.is_empty());

        harness.key(KeyCode::Down);
        assert_eq!(harness.runtime.requests.len(), 1);
        assert_eq!(harness.runtime.requests[0].mode, FetchMode::LoadMore);
        assert_eq!(harness.search.city().highlighted(), Some(PAGE_SIZE - 1));

        harness.step();
        assert_eq!(harness.search.city().highlighted(), Some(PAGE_SIZE));
    }

    #[test]
    fn failed_search_reports_status_until_cleared() {
        let mut runtime = TestRuntime::with_fixture();
        runtime.fail_with = Some("connection refused".to_owned());
        let mut harness = Harness::new(runtime);
        harness.settle();

        let status = harness.search.status_line().expect("status line");
        assert!(status.starts_with("city search failed"), "status {status}");
        assert!(!harness.search.city().is_loading());
        assert_eq!(harness.view_data.status_token, 1);

        harness
            .tx
            .send(InternalEvent::ClearStatus { token: 0 })
            .expect("send");
        harness.step();
        assert!(harness.search.status_line().is_some());

        harness
            .tx
            .send(InternalEvent::ClearStatus { token: 1 })
            .expect("send");
        harness.step();
        assert!(harness.search.status_line().is_none());
        assert!(status_text(&harness.search).contains("q quit"));
    }

    #[test]
    fn failed_load_more_is_not_retried_while_idle() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.type_text("תל אב");
        harness.settle();
        harness.runtime.requests.clear();

        harness.runtime.fail_with = Some("connection refused".to_owned());
        for _ in 0..3 {
            harness.key(KeyCode::PageDown);
        }
        harness.step();
        assert_eq!(harness.runtime.requests.len(), 1);
        harness.step();
        assert_eq!(harness.view_data.status_token, 1);
        assert!(harness.search.status_line().is_some());

        for _ in 0..10 {
            harness.step();
        }
        assert_eq!(harness.runtime.requests.len(), 1);
        assert_eq!(harness.view_data.status_token, 1);
        assert!(harness.search.city().has_more());

        harness.runtime.fail_with = None;
        harness.key(KeyCode::PageDown);
        harness.step();
        assert_eq!(harness.runtime.requests.len(), 2);
        assert_eq!(harness.runtime.requests[1].mode, FetchMode::LoadMore);
        harness.step();
        assert_eq!(harness.search.city().items().len(), 25);
    }

    #[test]
    fn latest_search_wins_over_late_responses() {
        let mut runtime = TestRuntime::with_fixture();
        runtime.hold = true;
        let mut harness = Harness::new(runtime);
        harness.key(KeyCode::Tab);
        harness.type_text("חי");
        harness.advance(DEBOUNCE);
        let first = harness.runtime.held[0].clone();

        harness.type_text("פ");
        harness.advance(DEBOUNCE);
        assert_eq!(
            harness.runtime.canceled,
            vec![(FieldKind::City, first.request_id)]
        );
        let second = harness.runtime.held[1].clone();
        assert_eq!(second.search, "חיפ");

        harness.deliver(&second);
        harness.deliver(&first);
        let names: Vec<&str> = harness
            .search
            .city()
            .items()
            .iter()
            .map(|c| c.city_name.as_str())
            .collect();
        assert_eq!(names, vec!["חיפה"]);
        assert!(!harness.search.city().is_loading());
    }

    #[test]
    fn quit_keys() {
        let mut harness = Harness::new(TestRuntime::default());
        assert!(harness.key_with(KeyCode::Char('c'), KeyModifiers::CONTROL));

        harness.key(KeyCode::Tab);
        assert!(!harness.key(KeyCode::Char('q')));
        assert_eq!(harness.search.city().search_text(), "q");

        harness.key(KeyCode::Esc);
        assert_eq!(harness.search.focus(), None);
        assert!(harness.key(KeyCode::Char('q')));
    }

    #[test]
    fn street_focus_is_refused_without_city() {
        let mut harness = Harness::new(TestRuntime::default());
        harness.key(KeyCode::Char('s'));
        assert_eq!(harness.search.focus(), None);
        harness.key(KeyCode::Tab);
        harness.key(KeyCode::Tab);
        assert_eq!(harness.search.focus(), Some(FieldKind::City));
    }

    #[test]
    fn viewport_follows_highlight_and_resets_on_new_list() {
        let mut viewport = DropdownViewport::default();
        viewport.sync(20, Some(10), 1);
        assert_eq!(viewport.offset, 3);
        viewport.sync(20, Some(2), 1);
        assert_eq!(viewport.offset, 2);

        viewport.scroll(100, 20);
        assert_eq!(viewport.offset, 13);
        assert!(viewport.sentinel_visible(20));
        viewport.sync(20, Some(2), 1);
        assert_eq!(viewport.offset, 13);

        viewport.sync(20, None, 2);
        assert_eq!(viewport.offset, 0);
        assert!(!viewport.sentinel_visible(20));
        assert!(viewport.sentinel_visible(3));
    }

    #[test]
    fn dropdown_rows_cover_hint_and_empty_states() {
        let mut harness = Harness::new(TestRuntime::with_fixture());
        harness.key(KeyCode::Tab);
        harness.settle();
        harness.key(KeyCode::Down);
        let rows = dropdown_rows(harness.search.city(), &harness.view_data.city_viewport);
        assert_eq!(rows.len(), 8);
        assert!(matches!(
            &rows[0],
            DropdownRow::Item { highlighted: true, .. }
        ));

        harness.type_text("חיפה");
        harness.settle();
        let rows = dropdown_rows(harness.search.city(), &harness.view_data.city_viewport);
        assert_eq!(
            rows,
            vec![DropdownRow::Item {
                label: "חיפה".to_owned(),
                key: 4000,
                highlighted: false,
            }]
        );

        harness.type_text("zz");
        harness.settle();
        let rows = dropdown_rows(harness.search.city(), &harness.view_data.city_viewport);
        assert_eq!(rows, vec![DropdownRow::NoResults]);

        let mut viewport = DropdownViewport::default();
        viewport.offset = 13;
        harness.key_with(KeyCode::Char('u'), KeyModifiers::CONTROL);
        harness.settle();
        harness.key(KeyCode::Down);
        let rows = dropdown_rows(harness.search.city(), &viewport);
        assert_eq!(rows.last(), Some(&DropdownRow::MoreHint));
    }

    #[test]
    fn selection_text_prompts_until_chosen() {
        let harness = Harness::new(TestRuntime::default());
        assert_eq!(
            selection_text(&harness.search),
            "city:   please choose a city…\nstreet: please choose a street…"
        );
    }

    #[test]
    fn render_shows_disabled_street_and_prompts() -> Result<()> {
        let harness = Harness::new(TestRuntime::default());
        let mut terminal = Terminal::new(TestBackend::new(80, 24))?;
        terminal.draw(|frame| render(frame, &harness.search, &harness.view_data))?;

        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("choose a city first"));
        assert!(screen.contains("please choose a city"));
        assert!(screen.contains("type a city name"));
        Ok(())
    }
}
