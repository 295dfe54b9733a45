use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{info, warn};

use crate::api::{ApiClient, Notice, ReqwestTransport, Submitted};
use crate::config::{Config, BAUD_RATES};
use crate::console::{Category, Console};
use crate::error::{FetchError, SubmitError};
use crate::form::Form;
use crate::pending::{PendingEntry, PendingQueue};
use crate::serial::{self, SerialEvent, SerialPortInfo, SerialSession};
use crate::ui;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Ports,
    Form,
    Console,
}

/// Results coming back from the API worker thread.
#[derive(Debug)]
pub enum ApiEvent {
    Submitted(Result<Submitted, SubmitError>),
    Fetched(Result<Vec<PendingEntry>, FetchError>),
}

pub struct AppState {
    pub config: Config,
    pub ports: Vec<SerialPortInfo>,
    pub selected_port: Option<usize>,
    pub baud_rate: u32,

    pub session: SerialSession,

    pub form: Form,
    pub pending: PendingQueue,
    pub console: Console,
    pub focus: Focus,

    pub notice: Option<Notice>,
    /// A request is in flight; only one at a time.
    pub busy: bool,

    api: Arc<ApiClient>,
    api_tx: Sender<ApiEvent>,
    api_rx: Receiver<ApiEvent>,
}

impl AppState {
    pub fn new(config: Config, api: ApiClient) -> Self {
        let (api_tx, api_rx) = mpsc::channel();
        Self {
            baud_rate: config.baud_rate,
            config,
            ports: Vec::new(),
            selected_port: None,
            session: SerialSession::default(),
            form: Form::default(),
            pending: PendingQueue::default(),
            console: Console::default(),
            focus: Focus::Form,
            notice: None,
            busy: false,
            api: Arc::new(api),
            api_tx,
            api_rx,
        }
    }

    fn log<S: Into<String>>(&mut self, category: Category, line: S) {
        self.console.push(category, line);
    }

    fn warn<S: Into<String>>(&mut self, category: Category, line: S) {
        self.console.warn(category, line);
    }

    fn banner(&mut self) {
        let rule = "=".repeat(60);
        self.log(Category::App, rule.clone());
        self.log(Category::App, "ARI RENDEMEN ANALYSIS");
        self.log(Category::App, format!("API: {}", self.api.url()));
        self.log(
            Category::Serial,
            "Select a port and press Enter in the Ports panel to connect",
        );
        self.log(Category::Serial, "Press r in the Ports panel to refresh the port list");
        self.log(
            Category::Info,
            "F2 send, F3 reset, F4 load pending samples, Tab to switch panels",
        );
        self.log(Category::App, rule);
    }

    pub fn selected_port_name(&self) -> Option<&str> {
        self.selected_port
            .and_then(|idx| self.ports.get(idx))
            .map(|p| p.port_name.as_str())
    }
}

pub fn run(config: Config) -> Result<()> {
    let transport = ReqwestTransport::new(config.http_timeout)?;
    let api = ApiClient::new(config.api_url.clone(), Box::new(transport));
    let mut app = AppState::new(config, api);
    refresh_ports(&mut app);
    app.banner();

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let res = run_inner(&mut terminal, &mut app);

    app.session.stop();
    disable_raw_mode().ok();
    execute!(
        io::stdout(),
        terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )
    .ok();
    terminal.show_cursor().ok();

    res
}

fn run_inner(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key_event(app, key) {
                    break;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            drain_serial_events(app);
            drain_api_events(app);
            last_tick = Instant::now();
        }
    }
    info!("quit requested");
    Ok(())
}

pub fn drain_serial_events(app: &mut AppState) {
    for ev in app.session.poll() {
        match ev {
            SerialEvent::Opened { port } => {
                app.log(Category::Serial, format!("Connected to {port}"));
            }
            SerialEvent::Line(line) => {
                app.log(Category::Serial, line);
            }
            SerialEvent::Parsed(reading) => {
                app.log(Category::Debug, format!("Parsed: {reading}"));
                app.form.apply_reading(&reading);
            }
            SerialEvent::Skipped(reason) => {
                app.log(Category::Debug, format!("Not parsed: {reason}"));
            }
            SerialEvent::Failed(err) => {
                app.warn(Category::Serial, format!("Error: {err}"));
            }
            SerialEvent::Closed => {
                app.log(Category::Serial, "Connection closed");
            }
        }
    }
}

pub fn drain_api_events(app: &mut AppState) {
    let drained: Vec<ApiEvent> = app.api_rx.try_iter().collect();
    for ev in drained {
        app.busy = false;
        match ev {
            ApiEvent::Submitted(result) => finish_submit(app, result),
            ApiEvent::Fetched(result) => finish_fetch(app, result),
        }
    }
}

/// Returns true when the app should quit.
pub fn handle_key_event(app: &mut AppState, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if app.notice.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.notice = None;
        }
        return false;
    }

    match key.code {
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Ports => Focus::Form,
                Focus::Form => Focus::Console,
                Focus::Console => Focus::Ports,
            };
        }
        KeyCode::BackTab => {
            app.focus = match app.focus {
                Focus::Ports => Focus::Console,
                Focus::Form => Focus::Ports,
                Focus::Console => Focus::Form,
            };
        }
        KeyCode::F(2) => submit_form(app),
        KeyCode::F(3) => reset_form(app),
        KeyCode::F(4) => load_pending(app),
        _ => match app.focus {
            Focus::Ports => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Up => move_selection(app, -1),
                KeyCode::Down => move_selection(app, 1),
                KeyCode::Enter => toggle_serial(app),
                KeyCode::Char('r') => {
                    refresh_ports(app);
                }
                KeyCode::Char('b') => cycle_baud(app, 1),
                KeyCode::Char('B') => cycle_baud(app, -1),
                _ => {}
            },
            Focus::Form => match key.code {
                KeyCode::Enter => {
                    if app.form.has_readings() {
                        submit_form(app);
                    }
                }
                KeyCode::Backspace => app.form.pop_identifier_char(),
                KeyCode::Left => {
                    if app.pending.prev() {
                        show_current_pending(app);
                    }
                }
                KeyCode::Right => {
                    if app.pending.next() {
                        show_current_pending(app);
                    }
                }
                KeyCode::Char(c) if !c.is_control() && !c.is_whitespace() => {
                    app.form.push_identifier_char(c);
                }
                _ => {}
            },
            Focus::Console => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('c') => app.console.clear(),
                KeyCode::PageUp => app.console.scroll_up(5),
                KeyCode::PageDown => app.console.scroll_down(5),
                KeyCode::Home => app.console.scroll_to_top(),
                KeyCode::End => app.console.scroll_to_bottom(),
                _ => {}
            },
        },
    }
    false
}

fn move_selection(app: &mut AppState, delta: isize) {
    if app.session.is_active() {
        return;
    }
    if app.ports.is_empty() {
        app.selected_port = None;
        return;
    }
    let len = app.ports.len() as isize;
    let current = app.selected_port.map(|i| i as isize).unwrap_or(0);
    let next = (current + delta).clamp(0, len - 1);
    app.selected_port = Some(next as usize);
}

fn cycle_baud(app: &mut AppState, step: isize) {
    if app.session.is_active() {
        return;
    }
    let len = BAUD_RATES.len() as isize;
    let idx = BAUD_RATES
        .iter()
        .position(|b| *b == app.baud_rate)
        .unwrap_or(0) as isize;
    app.baud_rate = BAUD_RATES[(idx + step).rem_euclid(len) as usize];
}

pub fn refresh_ports(app: &mut AppState) {
    if app.session.is_active() {
        return;
    }
    match serial::list_ports() {
        Ok(ports) => app.ports = ports,
        Err(e) => {
            warn!(error = %e, "port enumeration failed");
            app.warn(Category::Serial, format!("Error: {e:#}"));
            app.ports.clear();
        }
    }
    app.selected_port = app
        .ports
        .iter()
        .position(|p| p.port_name == app.config.preferred_port)
        .or(if app.ports.is_empty() { None } else { Some(0) });
    app.log(Category::Serial, "Port list refreshed");
}

fn toggle_serial(app: &mut AppState) {
    if app.session.is_active() {
        app.session.stop();
        app.log(Category::Serial, "Serial connection stopped");
        return;
    }

    let Some(port) = app.selected_port_name().map(str::to_string) else {
        app.warn(Category::Serial, "Error: select a COM port first!");
        app.notice = Some(Notice::error("Error", "Select a COM port first!"));
        return;
    };
    app.log(
        Category::Serial,
        format!("Starting serial connection to {port} at {} baud...", app.baud_rate),
    );
    let timeout = app.config.serial_timeout;
    let baud = app.baud_rate;
    app.session.start(&port, baud, timeout);
}

pub fn submit_form(app: &mut AppState) {
    if app.busy {
        app.log(Category::Api, "A request is already in progress");
        return;
    }
    app.busy = true;
    app.log(
        Category::App,
        format!("Sending data for Kartu ARI: {}", app.form.kartu_ari),
    );

    let api = Arc::clone(&app.api);
    let tx = app.api_tx.clone();
    let form = app.form.clone();
    let id = app.pending.correlation_id(&app.form.kartu_ari);
    thread::spawn(move || {
        let result = api.submit(&form, id);
        let _ = tx.send(ApiEvent::Submitted(result));
    });
}

fn finish_submit(app: &mut AppState, result: Result<Submitted, SubmitError>) {
    match &result {
        Ok(submitted) => {
            let s = &submitted.submission;
            app.log(Category::Data, format!("Brix ARI: {:?}", s.brix));
            app.log(Category::Data, format!("Pol ARI: {:?}", s.pol));
            app.log(Category::Data, format!("Pol Baca ARI: {:?}", s.pol_baca));
            app.log(Category::Data, format!("Rendemen ARI: {:?}", s.rendemen));
            app.log(Category::Api, format!("Status Code: {}", submitted.status));
            app.log(Category::Api, format!("Response: {}", submitted.body));
        }
        Err(SubmitError::Validation(e)) => app.log(Category::App, format!("Not sent: {e}")),
        Err(SubmitError::Timeout) => app.warn(Category::Api, "Error: Timeout"),
        Err(SubmitError::Unreachable(_)) => app.warn(Category::Api, "Error: Connection error"),
        Err(SubmitError::HttpStatus { status, body }) => {
            app.warn(Category::Api, format!("Status Code: {status}"));
            app.warn(Category::Api, format!("Response: {body}"));
        }
        Err(e) => app.warn(Category::Api, format!("Error: {e}")),
    }

    let notice = Notice::from_submit(&result);
    if notice.success() {
        app.form.reset();
        if app.pending.next() {
            show_current_pending(app);
        } else if !app.pending.is_empty() {
            app.pending.clear();
            app.log(Category::App, "All pending samples done");
        }
    }
    app.notice = Some(notice);
}

pub fn load_pending(app: &mut AppState) {
    if app.busy {
        app.log(Category::Api, "A request is already in progress");
        return;
    }
    app.busy = true;
    app.log(Category::App, "Loading pending samples...");

    let api = Arc::clone(&app.api);
    let tx = app.api_tx.clone();
    thread::spawn(move || {
        let result = api.fetch_pending();
        let _ = tx.send(ApiEvent::Fetched(result));
    });
}

fn finish_fetch(app: &mut AppState, result: Result<Vec<PendingEntry>, FetchError>) {
    match result {
        Ok(entries) => {
            let count = entries.len();
            app.pending.replace(entries);
            if count == 0 {
                app.log(Category::App, "No pending samples");
                app.form.set_identifier("");
            } else {
                show_current_pending(app);
                app.log(Category::App, format!("{count} samples found"));
            }
        }
        Err(e) => app.warn(Category::App, format!("Error loading data: {e}")),
    }
}

fn show_current_pending(app: &mut AppState) {
    if let Some(entry) = app.pending.current().cloned() {
        app.form.set_identifier(&entry.kartu_ari());
        app.log(Category::Data, entry.to_string());
    }
}

pub fn reset_form(app: &mut AppState) {
    app.form.reset();
    app.pending.clear();
    app.focus = Focus::Form;
    app.log(Category::App, "Form reset");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::api::{HttpResponse, HttpTransport, NoticeLevel, Query};
    use crate::console::Severity;
    use crate::error::TransportError;
    use crate::parser::Reading;
    use crate::serial::ReaderState;

    struct ScriptedTransport {
        replies: Mutex<Vec<Result<HttpResponse, TransportError>>>,
        calls: Arc<Mutex<Vec<Query>>>,
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, _url: &str, query: &Query) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(query.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn app_with(
        replies: Vec<Result<HttpResponse, TransportError>>,
    ) -> (AppState, Arc<Mutex<Vec<Query>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            replies: Mutex::new(replies),
            calls: Arc::clone(&calls),
        };
        let api = ApiClient::new("http://lab.test/ari.php", Box::new(transport));
        (AppState::new(Config::default(), api), calls)
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn wait_for_api(app: &mut AppState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.busy && Instant::now() < deadline {
            drain_api_events(app);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!app.busy, "api worker did not answer");
    }

    fn fill_readings(app: &mut AppState) {
        app.form.apply_reading(&Reading {
            pol_baca: 69.78,
            brix: 2.0,
            pol: 1.0,
        });
    }

    #[test]
    fn empty_identifier_is_not_sent() {
        let (mut app, calls) = app_with(vec![]);
        fill_readings(&mut app);
        submit_form(&mut app);
        wait_for_api(&mut app);

        assert!(calls.lock().unwrap().is_empty());
        let notice = app.notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(app.form.rendemen, "0.35");
    }

    #[test]
    fn timeout_keeps_form() {
        let (mut app, _) = app_with(vec![Err(TransportError::Timeout)]);
        fill_readings(&mut app);
        app.form.set_identifier("A00107");
        let before = app.form.clone();
        submit_form(&mut app);
        wait_for_api(&mut app);

        assert_eq!(app.form, before);
        assert!(app.notice.clone().unwrap().message.contains("Timeout"));
    }

    #[test]
    fn success_clears_form_and_moves_to_next_pending() {
        let (mut app, calls) = app_with(vec![
            ok(r#"{"status":"success","data":[{"id":1,"kartu_ari":"A1"},{"id":2,"kartu_ari":"A2"}]}"#),
            ok(r#"{"status":"success","message":"saved"}"#),
        ]);
        load_pending(&mut app);
        wait_for_api(&mut app);
        assert_eq!(app.form.kartu_ari, "A1");

        fill_readings(&mut app);
        submit_form(&mut app);
        wait_for_api(&mut app);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains(&("id", "1".to_string())));
        assert!(app.notice.clone().unwrap().success());
        assert_eq!(app.form.kartu_ari, "A2");
        assert!(!app.form.has_readings());
    }

    fn id_of(query: &Query) -> Option<&str> {
        query
            .iter()
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn id_is_not_reused_after_the_last_pending_entry() {
        let saved = r#"{"status":"success","message":"saved"}"#;
        let (mut app, calls) = app_with(vec![
            ok(r#"{"status":"success","data":[{"id":1,"kartu_ari":"A1"}]}"#),
            ok(saved),
            ok(saved),
        ]);
        load_pending(&mut app);
        wait_for_api(&mut app);
        fill_readings(&mut app);
        submit_form(&mut app);
        wait_for_api(&mut app);
        assert!(app.pending.is_empty());
        app.notice = None;

        app.form.set_identifier("B9");
        fill_readings(&mut app);
        submit_form(&mut app);
        wait_for_api(&mut app);

        let calls = calls.lock().unwrap();
        assert_eq!(id_of(&calls[1]), Some("1"));
        assert_eq!(calls[2][0], ("kartu_ari", "B9".to_string()));
        assert_eq!(id_of(&calls[2]), None);
    }

    #[test]
    fn edited_identifier_drops_the_pending_id() {
        let (mut app, calls) = app_with(vec![
            ok(r#"{"status":"success","data":[{"id":1,"kartu_ari":"A1"},{"id":2,"kartu_ari":"A2"}]}"#),
            ok(r#"{"status":"success","message":"saved"}"#),
        ]);
        load_pending(&mut app);
        wait_for_api(&mut app);
        app.form.set_identifier("C7");
        fill_readings(&mut app);
        submit_form(&mut app);
        wait_for_api(&mut app);

        assert_eq!(id_of(&calls.lock().unwrap()[1]), None);
    }

    #[test]
    fn serial_failure_is_logged_as_warning() {
        let (mut app, _) = app_with(vec![]);
        app.session.start_with("COM99", || -> io::Result<io::Empty> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such port"))
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.session.state() != ReaderState::Error && Instant::now() < deadline {
            drain_serial_events(&mut app);
            thread::sleep(Duration::from_millis(5));
        }

        let last = app.console.lines().last().unwrap();
        assert_eq!(last.category, Category::Serial);
        assert_eq!(last.severity, Severity::Warn);
        assert!(last.text.starts_with("Error: "));
    }

    #[test]
    fn enter_in_form_submits_only_with_readings() {
        let (mut app, calls) = app_with(vec![ok(r#"{"status":"success","message":"ok"}"#)]);
        app.form.set_identifier("A00107");
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);

        handle_key_event(&mut app, enter);
        assert!(!app.busy);

        fill_readings(&mut app);
        handle_key_event(&mut app, enter);
        assert!(app.busy);
        wait_for_api(&mut app);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn typing_q_in_form_does_not_quit() {
        let (mut app, _) = app_with(vec![]);
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        let quit = handle_key_event(&mut app, key);
        assert!(!quit);
        assert_eq!(app.form.kartu_ari, "q");
    }

    #[test]
    fn notice_swallows_keys_until_dismissed() {
        let (mut app, _) = app_with(vec![]);
        app.notice = Some(Notice::error("Error", "x"));
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(app.form.kartu_ari, "");
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(app.notice.is_none());
    }

    #[test]
    fn start_without_port_shows_notice() {
        let (mut app, _) = app_with(vec![]);
        app.focus = Focus::Ports;
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert!(app.notice.is_some());
        assert!(!app.session.is_active());
    }

    #[test]
    fn baud_cycles_both_ways() {
        let (mut app, _) = app_with(vec![]);
        assert_eq!(app.baud_rate, 9600);
        cycle_baud(&mut app, -1);
        assert_eq!(app.baud_rate, 230400);
        cycle_baud(&mut app, 1);
        cycle_baud(&mut app, 1);
        assert_eq!(app.baud_rate, 19200);
    }

    #[test]
    fn reset_clears_pending_queue() {
        let (mut app, _) = app_with(vec![ok(r#"{"status":"success","data":["B1","B2"]}"#)]);
        load_pending(&mut app);
        wait_for_api(&mut app);
        assert_eq!(app.pending.position(), Some((1, 2)));
        reset_form(&mut app);
        assert!(app.pending.is_empty());
        assert_eq!(app.form, Form::default());
    }
}
