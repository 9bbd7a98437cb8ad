use crate::display::{truncate, LocationEntry, MapView};
use crate::reconciliation::ReconciledLocation;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::BTreeSet;
use std::io;

/// One line of the collapsible listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRow {
    /// Index into `view.groups`
    State(usize),
    /// (group index, entry index)
    Entry(usize, usize),
}

pub struct App {
    pub locations: Vec<ReconciledLocation>,
    pub view: MapView,
    pub expanded: BTreeSet<String>,
    pub state: ListState,
    pub show_detail: bool,
}

impl App {
    pub fn new(locations: Vec<ReconciledLocation>, state_filter: Option<&str>) -> Self {
        let view = MapView::build(&locations, state_filter);
        let mut app = Self {
            locations,
            view,
            expanded: BTreeSet::new(),
            state: ListState::default(),
            show_detail: true,
        };
        app.after_view_change();
        app
    }

    fn after_view_change(&mut self) {
        // A single-state view starts expanded
        if self.view.state_filter.is_some() {
            self.expanded = self.view.groups.iter().map(|g| g.state.clone()).collect();
        }
        let first = if self.view.groups.is_empty() { None } else { Some(0) };
        self.state.select(first);
    }

    pub fn rows(&self) -> Vec<ListRow> {
        let mut rows = Vec::new();
        for (gi, group) in self.view.groups.iter().enumerate() {
            rows.push(ListRow::State(gi));
            if self.expanded.contains(&group.state) {
                rows.extend((0..group.entries.len()).map(|ei| ListRow::Entry(gi, ei)));
            }
        }
        rows
    }

    pub fn selected_row(&self) -> Option<ListRow> {
        self.state.selected().and_then(|i| self.rows().get(i).copied())
    }

    pub fn selected_entry(&self) -> Option<&LocationEntry> {
        match self.selected_row()? {
            ListRow::Entry(gi, ei) => self.view.groups.get(gi)?.entries.get(ei),
            ListRow::State(_) => None,
        }
    }

    /// Expand/collapse the state under the cursor (or the entry's parent)
    pub fn toggle_selected(&mut self) {
        let (gi, on_entry) = match self.selected_row() {
            Some(ListRow::State(gi)) => (gi, false),
            Some(ListRow::Entry(gi, _)) => (gi, true),
            None => return,
        };
        let state = self.view.groups[gi].state.clone();

        if !self.expanded.remove(&state) {
            self.expanded.insert(state);
        }

        // Collapsing from an entry moves the cursor back to its state header
        if on_entry {
            let pos = self.rows().iter().position(|r| *r == ListRow::State(gi));
            self.state.select(pos);
        }
    }

    pub fn expand_all(&mut self) {
        self.expanded = self.view.groups.iter().map(|g| g.state.clone()).collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
        let len = self.rows().len();
        if let Some(i) = self.state.selected() {
            if i >= len {
                self.state.select(len.checked_sub(1));
            }
        }
    }

    /// Step the state filter: all → first state → … → last state → all
    pub fn cycle_filter(&mut self) {
        let states = &self.view.states;
        let next = match &self.view.state_filter {
            None => states.first().cloned(),
            Some(current) => states
                .iter()
                .position(|s| s.eq_ignore_ascii_case(current))
                .and_then(|i| states.get(i + 1))
                .cloned(),
        };
        self.apply_filter(next.as_deref());
    }

    pub fn apply_filter(&mut self, state: Option<&str>) {
        self.view = MapView::build(&self.locations, state);
        self.after_view_change();
    }

    pub fn clear_filter(&mut self) {
        self.apply_filter(None);
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next(&mut self) {
        self.move_by(1);
    }

    pub fn previous(&mut self) {
        self.move_by(-1);
    }

    pub fn page_down(&mut self) {
        self.move_clamped(20);
    }

    pub fn page_up(&mut self) {
        self.move_clamped(-20);
    }

    /// Wrapping move
    fn move_by(&mut self, delta: isize) {
        let len = self.rows().len() as isize;
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => (i as isize + delta).rem_euclid(len),
            None => 0,
        };
        self.state.select(Some(i as usize));
    }

    fn move_clamped(&mut self, delta: isize) {
        let len = self.rows().len() as isize;
        if len == 0 {
            return;
        }
        let i = self.state.selected().unwrap_or(0) as isize + delta;
        self.state.select(Some(i.clamp(0, len - 1) as usize));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter | KeyCode::Char(' ') => app.toggle_selected(),
                KeyCode::Char('d') => app.toggle_detail(),
                KeyCode::Char('f') => app.cycle_filter(),
                KeyCode::Char('c') => app.clear_filter(),
                KeyCode::Char('e') => app.expand_all(),
                KeyCode::Char('x') => app.collapse_all(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    let len = app.rows().len();
                    app.state.select(len.checked_sub(1));
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Listing + detail
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[1]);
        render_listing(f, content[0], app);
        render_detail_panel(f, content[1], app);
    } else {
        render_listing(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let filter = app.view.state_filter.as_deref().unwrap_or("All states");
    let spans = vec![
        Span::styled(
            "Branch Locator",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("{} locations", app.view.location_count()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Filter: {}", filter), Style::default().fg(Color::Green)),
        Span::raw("  |  "),
        Span::styled(
            format!(
                "View: ({:.2}, {:.2}) z{}",
                app.view.viewport.latitude, app.view.viewport.longitude, app.view.viewport.zoom
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn render_listing(f: &mut Frame, area: Rect, app: &mut App) {
    let width = area.width.saturating_sub(8) as usize;
    let items: Vec<ListItem> = app
        .rows()
        .into_iter()
        .map(|row| match row {
            ListRow::State(gi) => {
                let group = &app.view.groups[gi];
                let marker = if app.expanded.contains(&group.state) { "▾" } else { "▸" };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{} {}", marker, group.label()),
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  ({})", group.entries.len()),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]))
            }
            ListRow::Entry(gi, ei) => {
                let e = &app.view.groups[gi].entries[ei];
                let text = format!("{} @ {} - {}", e.branch_name, e.pub_name, e.pub_city);
                ListItem::new(Line::from(format!("    {}", truncate(&text, width))))
            }
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Branches by State "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(list, area, &mut app.state);
}

fn field_line<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Location Details ");

    let entry = match app.selected_entry() {
        Some(e) => e,
        None => {
            let hint = match app.selected_row() {
                Some(ListRow::State(gi)) => {
                    let group = &app.view.groups[gi];
                    format!("{}: {}", group.label(), group.cities().join(", "))
                }
                _ => "No location selected".to_string(),
            };
            let paragraph = Paragraph::new(hint).wrap(Wrap { trim: true }).block(block);
            f.render_widget(paragraph, area);
            return;
        }
    };

    let mut content = vec![
        Line::from(""),
        field_line("Branch", entry.branch_name.clone()),
        field_line("Pub", entry.pub_name.clone()),
        field_line("Address", entry.address.clone()),
        field_line("Position", format!("{:.5}, {:.5}", entry.latitude, entry.longitude)),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        field_line("Map", entry.links.map.clone()),
    ];
    if let Some(fb) = &entry.links.facebook {
        content.push(field_line("Facebook", fb.clone()));
    }
    if let Some(tw) = &entry.links.twitter {
        content.push(field_line("Twitter", tw.clone()));
    }

    let paragraph = Paragraph::new(content).wrap(Wrap { trim: false }).block(block);
    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.rows().len();

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, total), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        key("Enter"),
        Span::raw(" Expand | "),
        key("f"),
        Span::raw(" Next state | "),
        key("c"),
        Span::raw(" Clear | "),
        key("e/x"),
        Span::raw(" All | "),
        key("d"),
        Span::raw(" Details | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, area);
}
