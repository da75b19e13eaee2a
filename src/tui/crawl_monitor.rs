//! TUI showing crawl progress as pages finish

use crate::crawler::{CrawlEvent, PageOutcome, PageResult};
use crate::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Duration;

/// Maximum number of recent pages kept per list
const MAX_RECENT_PAGES: usize = 100;

/// Live view of a running crawl
pub struct CrawlMonitor {
    events: UnboundedReceiver<CrawlEvent>,
    /// Raised when the user asks the crawl to stop
    stop: Arc<AtomicBool>,
    total: usize,
    finished: usize,
    saved: usize,
    duplicates: usize,
    skipped: usize,
    failed: usize,
    retries: usize,
    recent_saved: VecDeque<PageResult>,
    recent_rejected: VecDeque<PageResult>,
    /// Selected list (0 = saved, 1 = rejected)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl CrawlMonitor {
    pub fn new(events: UnboundedReceiver<CrawlEvent>, total: usize, stop: Arc<AtomicBool>) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            events,
            stop,
            total,
            finished: 0,
            saved: 0,
            duplicates: 0,
            skipped: 0,
            failed: 0,
            retries: 0,
            recent_saved: VecDeque::new(),
            recent_rejected: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting crawl... Press 'q' to stop.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run until the user quits; the terminal is restored on the way out
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Drain whatever arrived since the last frame
            loop {
                match self.events.try_recv() {
                    Ok(event) => self.apply(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.mark_complete(self.stop.load(Ordering::SeqCst));
                        break;
                    }
                }
            }

            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn apply(&mut self, event: CrawlEvent) {
        match event {
            CrawlEvent::BatchStarted {
                batch,
                total_batches,
                size,
            } => {
                self.status_message = format!(
                    "Batch {}/{} ({} URLs) | Saved: {} | Duplicates: {} | Skipped: {} | Failed: {}",
                    batch, total_batches, size, self.saved, self.duplicates, self.skipped, self.failed
                );
            }
            CrawlEvent::Retrying {
                url,
                attempt,
                delay,
                error,
            } => {
                self.retries += 1;
                self.status_message = format!(
                    "Retrying {} after attempt {} in {:?}: {}",
                    url, attempt, delay, error
                );
            }
            CrawlEvent::PageFinished(result) => self.record(result),
            CrawlEvent::Completed { interrupted } => self.mark_complete(interrupted),
        }
    }

    fn record(&mut self, result: PageResult) {
        self.finished += 1;
        let list = match result.outcome {
            PageOutcome::Saved { .. } => {
                self.saved += 1;
                &mut self.recent_saved
            }
            PageOutcome::Duplicate { .. } => {
                self.duplicates += 1;
                &mut self.recent_rejected
            }
            PageOutcome::Skipped { .. } => {
                self.skipped += 1;
                &mut self.recent_rejected
            }
            PageOutcome::Failed { .. } => {
                self.failed += 1;
                &mut self.recent_rejected
            }
        };

        list.push_back(result);
        if list.len() > MAX_RECENT_PAGES {
            list.pop_front();
        }

        if !self.is_complete {
            let percentage = (self.finished as f64 / self.total.max(1) as f64 * 100.0) as u32;
            self.status_message = format!(
                "Crawling... {}% ({}/{}) | Saved: {} | Duplicates: {} | Skipped: {} | Failed: {}",
                percentage,
                self.finished,
                self.total,
                self.saved,
                self.duplicates,
                self.skipped,
                self.failed
            );
        }
    }

    fn mark_complete(&mut self, interrupted: bool) {
        if self.is_complete {
            return;
        }
        self.is_complete = true;
        let prefix = if interrupted { "Stopped" } else { "Complete" };
        self.status_message = format!(
            "{}! Crawled: {}/{} | Saved: {} | Duplicates: {} | Skipped: {} | Failed: {} | Retries: {} | Press 'q' to quit",
            prefix,
            self.finished,
            self.total,
            self.saved,
            self.duplicates,
            self.skipped,
            self.failed,
            self.retries
        );
    }

    fn handle_input(&mut self, key: KeyEvent) {
        // Raw mode swallows SIGINT, so Ctrl-C arrives here as a key
        let interrupt =
            key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.request_stop(),
            _ if interrupt => self.request_stop(),
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected().len();
                let i = match self.list_state.selected() {
                    Some(i) if i < len.saturating_sub(1) => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected().len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    /// First press stops the crawl after its batch, a second one leaves
    fn request_stop(&mut self) {
        if self.is_complete || self.stop.swap(true, Ordering::SeqCst) {
            self.should_quit = true;
        } else {
            self.status_message =
                "Stopping after the current batch... Press 'q' again to leave now.".to_string();
        }
    }

    fn selected(&self) -> &VecDeque<PageResult> {
        if self.selected_list == 0 {
            &self.recent_saved
        } else {
            &self.recent_rejected
        }
    }

    fn progress(&self) -> u16 {
        if self.total > 0 {
            (self.finished.min(self.total) as f64 / self.total as f64 * 100.0) as u16
        } else {
            0
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Page lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Malayalam Crawler")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let progress = self.progress();
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress)
            .label(format!("{}/{} ({}%)", self.finished, self.total, progress));
        f.render_widget(gauge, chunks[1]);

        let page_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        let rejected = self.duplicates + self.skipped + self.failed;
        Self::render_page_list(
            f,
            page_chunks[0],
            "Saved",
            &self.recent_saved,
            self.saved,
            self.selected_list == 0,
            if self.selected_list == 0 { Some(&mut self.list_state) } else { None },
        );
        Self::render_page_list(
            f,
            page_chunks[1],
            "Rejected",
            &self.recent_rejected,
            rejected,
            self.selected_list == 1,
            if self.selected_list == 1 { Some(&mut self.list_state) } else { None },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    fn render_page_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        results: &VecDeque<PageResult>,
        total_count: usize,
        is_selected: bool,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = results
            .iter()
            .rev()
            .map(|result| ListItem::new(describe(result)).style(Style::default().fg(color(&result.outcome))))
            .collect();

        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({})", title, total_count))
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}

fn color(outcome: &PageOutcome) -> Color {
    match outcome {
        PageOutcome::Saved { .. } => Color::Green,
        PageOutcome::Duplicate { .. } => Color::Blue,
        PageOutcome::Skipped { .. } => Color::Yellow,
        PageOutcome::Failed { .. } => Color::Red,
    }
}

/// One-line summary of a finished page
fn describe(result: &PageResult) -> String {
    let source = if result.from_cache { " [cache]" } else { "" };
    match &result.outcome {
        PageOutcome::Saved { similarity, .. } => {
            let title = result.title.as_deref().unwrap_or("untitled");
            format!("{}{} - {} (max sim {:.2})", result.url, source, title, similarity)
        }
        PageOutcome::Duplicate { similarity, of } => {
            format!("{}{} duplicate of {} ({:.2})", result.url, source, of, similarity)
        }
        PageOutcome::Skipped { reason } => format!("{}{} skipped: {}", result.url, source, reason),
        PageOutcome::Failed { error } => {
            format!("{} failed after {} attempts: {}", result.url, result.attempts, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::mpsc::unbounded_channel;

    fn monitor(total: usize) -> CrawlMonitor {
        let (_tx, rx) = unbounded_channel();
        CrawlMonitor::new(rx, total, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_events_update_counters() {
        let mut monitor = monitor(3);
        monitor.apply(CrawlEvent::PageFinished(PageResult::new(
            "https://a.example/",
            PageOutcome::Saved {
                path: PathBuf::from("a.md"),
                similarity: 0.0,
            },
        )));
        monitor.apply(CrawlEvent::Retrying {
            url: "https://b.example/".to_string(),
            attempt: 1,
            delay: Duration::from_secs(1),
            error: "HTTP status 503".to_string(),
        });
        monitor.apply(CrawlEvent::PageFinished(PageResult::new(
            "https://b.example/",
            PageOutcome::Failed {
                error: "HTTP status 503".to_string(),
            },
        )));

        assert_eq!(monitor.finished, 2);
        assert_eq!(monitor.saved, 1);
        assert_eq!(monitor.failed, 1);
        assert_eq!(monitor.retries, 1);
        assert_eq!(monitor.recent_saved.len(), 1);
        assert_eq!(monitor.recent_rejected.len(), 1);
        assert_eq!(monitor.progress(), 66);

        monitor.apply(CrawlEvent::Completed { interrupted: false });
        assert!(monitor.is_complete);
        assert!(monitor.status_message.starts_with("Complete!"));
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_quit_requests_stop_first() {
        let mut monitor = monitor(10);
        monitor.handle_input(key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(monitor.stop.load(Ordering::SeqCst));
        assert!(!monitor.should_quit);

        monitor.handle_input(key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(monitor.should_quit);
    }

    #[test]
    fn test_ctrl_c_stops_crawl() {
        let mut monitor = monitor(10);
        monitor.handle_input(key(KeyCode::Char('c'), KeyModifiers::NONE));
        assert!(!monitor.stop.load(Ordering::SeqCst));

        monitor.handle_input(key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(monitor.stop.load(Ordering::SeqCst));
        assert!(!monitor.should_quit);

        monitor.handle_input(key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(monitor.should_quit);
    }

    #[test]
    fn test_recent_list_is_bounded() {
        let mut monitor = monitor(MAX_RECENT_PAGES + 5);
        for i in 0..MAX_RECENT_PAGES + 5 {
            monitor.record(PageResult::new(
                format!("https://e.example/{}", i),
                PageOutcome::Skipped {
                    reason: "empty content".to_string(),
                },
            ));
        }
        assert_eq!(monitor.recent_rejected.len(), MAX_RECENT_PAGES);
        assert_eq!(monitor.skipped, MAX_RECENT_PAGES + 5);
    }

    #[test]
    fn test_describe() {
        let mut result = PageResult::new(
            "https://a.example/",
            PageOutcome::Duplicate {
                similarity: 0.93,
                of: "https://b.example/".to_string(),
            },
        );
        result.from_cache = true;
        assert_eq!(
            describe(&result),
            "https://a.example/ [cache] duplicate of https://b.example/ (0.93)"
        );
    }
}
