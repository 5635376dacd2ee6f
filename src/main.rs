pub mod ui;

use std::collections::VecDeque;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{self, stdin};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use subjective::{
    config,
    engine::{Command, EngineOptions, SessionEngine, SessionEvent, SystemClock},
    media::DirectoryLibrary,
    playback::{CommandPlayer, Player},
    runtime::{AppEvent, AppEventSource, CrosstermEventSource, FixedTicker, Runner, Ticker},
    session::SessionState,
    settings::{FileSettingsStore, Settings, SettingsStore, StorageLayout},
    validator::{self, ValidationReport},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::ui::{same_prompt, screen::current_screen, PromptState, SessionScreen};

const TICK_RATE_MS: u64 = 200;
const LOG_FILE_NAME: &str = "subjective.log";
/// Reported to the session when the player cannot even be launched
const LAUNCH_FAILURE_CODE: i32 = -1;
const BREAK_OVER_NOTICE: &str = "The break is over.";

/// terminal player for subjective video quality tests
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Plays the videos listed in a participant's config file, collects quality ratings and questionnaire answers, and writes them to CSV logs."
)]
pub struct Cli {
    /// folder holding SubjectiveCfg/, SubjectiveMovies/ and SubjectiveLogs/
    #[clap(long, global = true)]
    root: Option<PathBuf>,

    /// settings file to use instead of the per-user one
    #[clap(long, global = true)]
    settings_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// run a session for one participant
    Run {
        /// participant ID, selects subject_<ID>.json or subject_<ID>.cfg
        #[clap(short, long)]
        id: u32,
    },
    /// check every config file against the videos folder
    Validate,
    /// show or change stored preferences
    Settings {
        #[clap(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SettingsAction {
    Show,
    /// e.g. `set allow_duplicate_ids true`
    Set { key: String, value: String },
}

impl Cli {
    fn settings_store(&self) -> FileSettingsStore {
        match &self.settings_file {
            Some(path) => FileSettingsStore::with_path(path),
            None => FileSettingsStore::new(),
        }
    }

    fn layout(&self, settings: &Settings) -> StorageLayout {
        match &self.root {
            Some(root) => StorageLayout::new(root),
            None => StorageLayout::from(settings),
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };
    if installed.is_err() {
        eprintln!("logging was already initialised");
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Run { id } => run_session(&cli, *id),
        Commands::Validate => run_validate(&cli),
        Commands::Settings { action } => run_settings(&cli, action.as_ref()),
    };
    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_settings(cli: &Cli, action: Option<&SettingsAction>) -> Result<i32, Box<dyn Error>> {
    init_logging(None)?;
    let store = cli.settings_store();
    let mut settings = store.load();
    if let Some(SettingsAction::Set { key, value }) = action {
        settings.set(key, value)?;
        store.save(&settings)?;
        info!(key = %key, "setting updated");
    }
    println!("# {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(0)
}

fn run_validate(cli: &Cli) -> Result<i32, Box<dyn Error>> {
    init_logging(None)?;
    let settings = cli.settings_store().load();
    let layout = cli.layout(&settings);
    let config_dir = layout.config_dir();
    if !config_dir.is_dir() {
        println!("Config folder {} does not exist", config_dir.display());
        return Ok(1);
    }
    let report = validator::validate_directory(&config_dir, &layout.media_dir())?;
    print_report(&report);
    Ok(if report.is_ok() { 0 } else { 1 })
}

fn print_report(report: &ValidationReport) {
    println!(
        "{:<28} {:>4}  {:<16} {:>6} {:>8} {:>6}",
        "FILE", "ID", "METHOD", "VIDEOS", "TRAINING", "BREAKS"
    );
    for summary in &report.summaries {
        println!(
            "{:<28} {:>4}  {:<16} {:>6} {:>8} {:>6}",
            summary.file_name,
            summary.participant_label(),
            summary.method.to_string(),
            summary.video_count,
            summary.training_video_count,
            summary.break_count
        );
    }
    println!();
    if report.is_ok() {
        println!("All {} config files are valid.", report.summaries.len());
        return;
    }
    let noun = if report.errors.len() == 1 { "error" } else { "errors" };
    println!("{} {noun} found:", report.errors.len());
    for error in &report.errors {
        println!("• {error}");
    }
}

fn run_session(cli: &Cli, participant_id: u32) -> Result<i32, Box<dyn Error>> {
    let settings = cli.settings_store().load();
    let layout = cli.layout(&settings);
    layout.ensure_dirs()?;
    init_logging(Some(&layout.logs_dir().join(LOG_FILE_NAME)))?;

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    layout.check_participant_id(participant_id, &settings)?;
    let config_path = layout.resolve_config(participant_id)?;
    let document = config::parse_config_file(&config_path);
    let state = SessionState::from_document(
        &document,
        participant_id,
        &DirectoryLibrary::new(layout.media_dir()),
    )?;
    info!(config = %config_path.display(), participant = participant_id, "config loaded");

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let player = CommandPlayer::new(&settings.player_command, &settings.probe_command, runner.sender());
    let engine = SessionEngine::new(
        state,
        Box::new(DirectoryLibrary::new(layout.media_dir())),
        Box::new(SystemClock),
        EngineOptions::new(layout.logs_dir()),
    );
    let mut app = App::new(engine, player, settings.no_ticks);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    if let Some(path) = app.rating_log {
        println!("Ratings written to {}", path.display());
    }
    Ok(0)
}

pub struct App<P: Player> {
    pub engine: SessionEngine,
    pub player: P,
    pub prompt: PromptState,
    pub notice: Option<String>,
    pub no_ticks: bool,
    pub should_exit: bool,
    rating_log: Option<PathBuf>,
}

impl<P: Player> App<P> {
    pub fn new(engine: SessionEngine, player: P, no_ticks: bool) -> Self {
        Self {
            engine,
            player,
            prompt: PromptState::default(),
            notice: None,
            no_ticks,
            should_exit: false,
            rating_log: None,
        }
    }

    /// Feeds an event to the session and carries out the resulting commands.
    /// Player failures are fed back as playback errors.
    pub fn dispatch(&mut self, event: SessionEvent) -> subjective::Result<()> {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let before = self.engine.view();
            let commands = self.engine.handle(event)?;
            if let Some(path) = self.engine.rating_log_path() {
                self.rating_log = Some(path.clone());
            }
            for command in commands {
                match command {
                    Command::Prepare(path) => {
                        if let Err(e) = self.player.prepare(&path) {
                            error!(error = %e, "could not prepare video");
                            pending.push_back(SessionEvent::PlaybackError(LAUNCH_FAILURE_CODE));
                        }
                    }
                    Command::StartPlayback => {
                        if let Err(e) = self.player.start() {
                            error!(error = %e, "could not start playback");
                            pending.push_back(SessionEvent::PlaybackError(LAUNCH_FAILURE_CODE));
                        }
                    }
                    Command::StopPlayback => {
                        if let Err(e) = self.player.stop() {
                            warn!(error = %e, "could not stop playback");
                        }
                    }
                    Command::BreakElapsed => self.notice = Some(BREAK_OVER_NOTICE.to_string()),
                    Command::Notice(text) => self.notice = Some(text),
                    Command::Exit => self.should_exit = true,
                }
            }
            if !same_prompt(&before, &self.engine.view()) {
                self.prompt.reset();
            }
        }
        Ok(())
    }

    pub fn on_key(&mut self, key: KeyEvent) -> subjective::Result<()> {
        // ctrl+c cancels right away
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.dispatch(SessionEvent::Back)?;
            return self.dispatch(SessionEvent::Back);
        }
        if key.code == KeyCode::Esc {
            return self.dispatch(SessionEvent::Back);
        }
        self.notice = None;
        let view = self.engine.view();
        match current_screen(&view).on_key(key, &view, &mut self.prompt) {
            Some(event) => self.dispatch(event),
            None => Ok(()),
        }
    }

    pub fn on_app_event(&mut self, event: AppEvent) -> subjective::Result<()> {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Resize => Ok(()),
            AppEvent::Tick => self.dispatch(SessionEvent::Tick),
            AppEvent::Player(event) => self.dispatch(event.into()),
        }
    }
}

fn start_tui<B: Backend, E: AppEventSource, T: Ticker, P: Player>(
    terminal: &mut Terminal<B>,
    app: &mut App<P>,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    app.dispatch(SessionEvent::Begin)?;
    while !app.should_exit {
        terminal.draw(|f| ui(app, f))?;
        let event = runner.step();
        app.on_app_event(event)?;
    }
    Ok(())
}

fn ui<P: Player>(app: &App<P>, f: &mut Frame) {
    let view = app.engine.view();
    let screen = SessionScreen {
        view: &view,
        prompt: &app.prompt,
        notice: app.notice.as_deref(),
        no_ticks: app.no_ticks,
    };
    f.render_widget(&screen, f.area());
}
