//! Command-line front end
//!
//! Each command drives the same page controllers a graphical front end
//! would, then prints the result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

use toefl_core::countdown::parse_seconds;
use toefl_core::exam::{section_tasks, SectionTask, SpeakingPhase};
use toefl_core::{AudioPlayer, ClientConfig, CountdownPhase, MediaEvent, SectionKind, Urgency};
use toefl_net::UploadFile;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::viewmodel::{
    AddSectionPage, AdminReviewPage, ChooseSectionTypePage, DashboardPage, Gate, LoginForm,
    ProgressAction, RegisterForm, ReviewPage, Route, SectionDraft, SectionListPage, TestPage,
};
use crate::widgets::{HeadlessElement, TimerWidget};

#[derive(Debug, Parser)]
#[command(name = "toefl")]
#[command(about = "Practice client for the TOEFL preparation service")]
#[command(version)]
pub struct Cli {
    /// Backend base URL, overriding the config file
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory for durable storage, overriding the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long = "confirm")]
        confirm_password: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List sections of one kind
    Sections {
        /// reading, listening, speaking or writing
        kind: SectionKind,
    },
    /// Overview of every section kind
    Dashboard,
    /// Section types an author can add
    Choose,
    /// Open a section, record answers and submit them
    Take {
        kind: SectionKind,
        id: i64,
        /// Answer as QUESTION=VALUE; JSON values are kept typed
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, Value)>,
        /// Speaking recording as taskN=PATH
        #[arg(long = "recording", value_parser = parse_file_field)]
        recordings: Vec<(String, PathBuf)>,
        /// Wait for the section clock (or each speaking phase) to run out
        #[arg(long)]
        wait: bool,
    },
    /// Sections you have completed
    Review,
    /// Sections of one kind with submissions to grade (admins)
    AdminReview { kind: SectionKind },
    /// Grade one submitted response (admins)
    Feedback {
        kind: SectionKind,
        response_id: i64,
        #[arg(long)]
        feedback: String,
        #[arg(long)]
        score: Option<f64>,
    },
    /// Create a section from a JSON draft (admins)
    AddSection {
        kind: SectionKind,
        /// JSON file holding the draft
        #[arg(long)]
        draft: PathBuf,
        /// Attached file as FIELD=PATH, e.g. audio:a1=tour.mp3 or task2=notice.mp3
        #[arg(long = "file", value_parser = parse_file_field)]
        files: Vec<(String, PathBuf)>,
    },
    /// Run a countdown in the terminal
    Timer {
        /// Duration in seconds; anything else counts as zero
        seconds: String,
    },
}

impl Cli {
    /// Layer command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

pub async fn dispatch(command: Command, state: &AppState) -> Result<()> {
    let session = state.session();

    match command {
        Command::Login { email, password } => {
            let route = LoginForm::new(email, password).submit(&session).await?;
            print_signed_in(state, route);
        }
        Command::Register {
            username,
            email,
            password,
            confirm_password,
        } => {
            let form = RegisterForm {
                username,
                email,
                password,
                confirm_password,
            };
            let route = form.submit(&session).await?;
            print_signed_in(state, route);
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out.");
        }
        Command::Whoami => whoami(state),
        Command::Sections { kind } => {
            let mut page = SectionListPage::new(kind, session, state.sections());
            require_allowed(page.load().await)?;
            if let Some(message) = page.error() {
                return Err(AppError::Validation(message.to_string()));
            }
            println!("{} sections:", kind.title());
            if page.sections().is_empty() {
                println!("  (none yet)");
            }
            for section in page.sections() {
                println!("  {:>4}  {}  -> {}", section.id, section.title, page.start(section.id));
            }
        }
        Command::Dashboard => {
            let mut page = DashboardPage::new(session, state.sections());
            require_allowed(page.load().await)?;
            for kind in SectionKind::ALL {
                match page.sections(kind) {
                    Some(list) => println!("{:<10} {} available", kind.title(), list.total()),
                    None => println!("{:<10} unavailable", kind.title()),
                }
            }
            if let Some(message) = page.error() {
                eprintln!("{}", message);
            }
            match page.progress_action() {
                ProgressAction::Navigate(route) => println!("Authoring: {}", route),
                ProgressAction::Notice(notice) => println!("{}", notice),
            }
        }
        Command::Choose => {
            let page = ChooseSectionTypePage::new(session);
            require_allowed(page.open())?;
            for option in page.options() {
                println!("{:<10} {}", option.title, option.route());
                println!("           {}", option.description);
            }
        }
        Command::Take {
            kind,
            id,
            answers,
            recordings,
            wait,
        } => take(state, kind, id, answers, recordings, wait).await?,
        Command::Review => {
            let mut page = ReviewPage::new(session, state.review());
            require_allowed(page.load().await)?;
            if let Some(message) = page.error() {
                return Err(AppError::Validation(message.to_string()));
            }
            if page.summaries().is_empty() {
                println!("No completed sections yet.");
            }
            for kind in SectionKind::ALL {
                for summary in page.completed(kind) {
                    let when = summary
                        .completed_at
                        .map(|at| at.format("%Y-%m-%d").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:<10} {:>4}  {}  {}",
                        kind.title(),
                        summary.section_id,
                        summary.section_title,
                        when
                    );
                }
            }
        }
        Command::AdminReview { kind } => {
            let mut page = AdminReviewPage::new(kind, session, state.review());
            require_allowed(page.load().await)?;
            if let Some(message) = page.error() {
                return Err(AppError::Validation(message.to_string()));
            }
            println!("{} submissions awaiting review: {}", kind.title(), page.pending());
            for summary in page.summaries() {
                println!(
                    "  {:>4}  {}  ({} students)",
                    summary.section_id, summary.section_title, summary.student_count
                );
            }
            println!("Review page: {}", Route::AdminReview);
        }
        Command::Feedback {
            kind,
            response_id,
            feedback,
            score,
        } => {
            let page = AdminReviewPage::new(kind, session, state.review());
            let message = page.submit_feedback(response_id, score, &feedback).await?;
            if message.is_empty() {
                println!("Feedback saved.");
            } else {
                println!("{}", message);
            }
        }
        Command::AddSection { kind, draft, files } => {
            let page = AddSectionPage::new(kind, session, state.authoring());
            require_allowed(page.open())?;
            let draft = read_draft(kind, &draft, files)?;
            let created = page.submit(draft).await?;
            println!("Created {} section {}: {}", kind, created.id, created.title);
        }
        Command::Timer { seconds } => run_timer(&seconds).await?,
    }
    Ok(())
}

fn require_allowed(decision: Gate) -> Result<()> {
    match decision {
        Gate::Allow => Ok(()),
        Gate::RedirectToLogin | Gate::Defer => Err(AppError::login_required()),
    }
}

fn print_signed_in(state: &AppState, route: Route) {
    let session = state.session();
    if let Some(user) = session.user() {
        println!("Signed in as {} <{}>", user.username, user.email);
    }
    if !session.is_persisted() {
        eprintln!("Warning: the session could not be saved and will not survive a restart.");
    }
    println!("Next: {}", route);
}

fn whoami(state: &AppState) {
    let Some(session) = state.session().session() else {
        println!("Not logged in.");
        return;
    };
    let user = &session.user;
    println!("{} <{}>", user.username, user.email);
    println!("role: {}", user.role.as_deref().unwrap_or("student"));
    if let Some(expires) = session.expires_at() {
        println!("token expires: {}", expires.to_rfc3339());
    }
    println!("backend: {}", state.client().base_url());
    if let Ok(path) = state.config().storage_path() {
        println!("storage: {}", path.display());
    }
}

fn parse_answer(raw: &str) -> std::result::Result<(String, Value), String> {
    let (question, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION=VALUE, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((question.trim().to_string(), value))
}

fn parse_file_field(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    let (field, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=PATH, got '{}'", raw))?;
    Ok((field.trim().to_string(), PathBuf::from(path)))
}

fn read_upload(path: &Path) -> Result<UploadFile> {
    let bytes = std::fs::read(path).map_err(toefl_core::Error::from)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(UploadFile::new(file_name, bytes))
}

fn read_draft(kind: SectionKind, path: &Path, files: Vec<(String, PathBuf)>) -> Result<SectionDraft> {
    let json = std::fs::read_to_string(path).map_err(toefl_core::Error::from)?;
    let files = files
        .into_iter()
        .map(|(field, path)| -> Result<(String, UploadFile)> {
            Ok((field, read_upload(&path)?))
        })
        .collect::<Result<Vec<_>>>()?;
    SectionDraft::from_parts(kind, &json, files)
}

/// Event source of one attached player. Dropping it ends the player's pump.
struct Feed {
    task: Option<u32>,
    index: usize,
    events: mpsc::Sender<MediaEvent>,
}

/// Recordings in section content: listening clips, then task audio
fn audio_sources(content: &Value) -> Vec<(Option<u32>, String)> {
    let mut sources: Vec<(Option<u32>, String)> = content
        .get("audios")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("audio_url").and_then(Value::as_str))
        .map(|url| (None, url.to_string()))
        .collect();
    sources.extend(
        section_tasks(content)
            .into_iter()
            .filter(SectionTask::has_audio)
            .filter_map(|task| Some((Some(task.task_number), task.audio_url?))),
    );
    sources
}

fn attach_players(
    page: &mut TestPage<HeadlessElement>,
    sources: &[(Option<u32>, String)],
    autoplay: bool,
) -> Vec<Feed> {
    sources
        .iter()
        .map(|(task, url)| {
            let mut player = AudioPlayer::new(url.clone(), HeadlessElement::default());
            player.mount(autoplay);
            let (events, rx) = mpsc::channel(4);
            let index = page.attach_audio(player, rx);
            Feed {
                task: *task,
                index,
                events,
            }
        })
        .collect()
}

/// Go through every speaking task and attach the recordings given for it.
/// With `wait` each task's phases run first.
async fn speak(
    page: &mut TestPage<HeadlessElement>,
    feeds: &[Feed],
    files: &mut BTreeMap<u32, UploadFile>,
    wait: bool,
) -> Result<()> {
    loop {
        let Some(number) = page.current_task().map(|t| t.task_number) else {
            return Ok(());
        };
        if wait {
            loop {
                let phase = page.run_timed_phases().await?;
                if phase == SpeakingPhase::Completed {
                    break;
                }
                // Nothing is audible here, so the task audio counts as heard
                if let Some(feed) = feeds.iter().find(|f| f.task == Some(number)) {
                    if feed.events.send(MediaEvent::Ended).await.is_err() {
                        warn!(task_number = number, "Audio player is gone");
                    }
                }
                println!("  task {}: {:?} done", number, phase);
                page.advance_phase();
            }
        }
        if let Some(file) = files.remove(&number) {
            page.record(file)?;
            println!("  task {}: recording attached", number);
        }
        if !page.next_task() {
            return Ok(());
        }
    }
}

async fn take(
    state: &AppState,
    kind: SectionKind,
    id: i64,
    answers: Vec<(String, Value)>,
    recordings: Vec<(String, PathBuf)>,
    wait: bool,
) -> Result<()> {
    let mut page: TestPage<HeadlessElement> =
        TestPage::start(kind, id, state.session(), state.sections())?;
    let content = page.load().await?;
    let title = content.get("title").and_then(Value::as_str).unwrap_or("Untitled");
    println!("{} {}: {}", kind.title(), id, title);
    let sources: Vec<(Option<u32>, String)> = audio_sources(content)
        .into_iter()
        .map(|(task, url)| (task, state.client().file_url(&url)))
        .collect();

    for task in page.tasks() {
        println!(
            "  task {}: {}",
            task.task_number,
            task.prompt.as_deref().unwrap_or("(no prompt)")
        );
    }

    // Players only track transport state; `feeds` keeps their pumps running
    let feeds = attach_players(&mut page, &sources, state.config().autoplay);
    for (feed, (_, url)) in feeds.iter().zip(&sources) {
        println!("  audio {}: {}", feed.index + 1, url);
    }

    let result = if kind == SectionKind::Speaking {
        if !answers.is_empty() {
            return Err(AppError::Validation(
                "Speaking sections take recordings, not answers".into(),
            ));
        }
        let mut files = BTreeMap::new();
        for (field, path) in recordings {
            let number = field
                .strip_prefix("task")
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| {
                    AppError::Validation(format!("Expected taskN=PATH, got '{}'", field))
                })?;
            files.insert(number, read_upload(&path)?);
        }

        if wait {
            println!("Running each task; Ctrl-C stops early.");
            tokio::select! {
                walked = speak(&mut page, &feeds, &mut files, true) => walked?,
                _ = tokio::signal::ctrl_c() => println!("Stopped early."),
            }
        } else {
            speak(&mut page, &feeds, &mut files, false).await?;
        }
        page.submit().await?
    } else {
        if !recordings.is_empty() {
            return Err(AppError::Validation(
                "Only speaking sections take recordings".into(),
            ));
        }
        for (question, value) in answers {
            let task = question
                .strip_prefix("task")
                .and_then(|n| n.parse::<u32>().ok());
            match (kind, task, value) {
                (SectionKind::Writing, Some(number), Value::String(text)) => {
                    let progress = page.write_response(number, text)?;
                    let note = if progress.is_short() { " (short)" } else { "" };
                    println!(
                        "  task {}: {} words, {} recommended{}",
                        number, progress.words, progress.recommended, note
                    );
                }
                (_, _, value) => page.answer(question, value),
            }
        }

        match page.remaining() {
            Some(snap) if wait => {
                println!("Time limit {}; Ctrl-C submits early.", snap.display);
                let outcome = tokio::select! {
                    result = page.run_until_expired() => Some(result),
                    _ = tokio::signal::ctrl_c() => None,
                };
                match outcome {
                    Some(result) => result?,
                    None => page.submit().await?,
                }
            }
            _ => page.submit().await?,
        }
    };
    drop(feeds);

    match result.score {
        Some(score) => println!("Submitted. Score: {}", score),
        None => println!("Submitted."),
    }
    if let Some(message) = result.message {
        println!("{}", message);
    }
    Ok(())
}

async fn run_timer(input: &str) -> Result<()> {
    let seconds = i64::try_from(parse_seconds(input)).unwrap_or(i64::MAX);
    let expired = Arc::new(Notify::new());
    let on_expire = expired.clone();
    let widget = TimerWidget::spawn(seconds, true, move || on_expire.notify_one());
    let mut updates = widget.subscribe();

    println!("{}", widget.snapshot().display);
    if widget.snapshot().phase != CountdownPhase::Running {
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = expired.notified() => {
                println!("Time is up.");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = updates.borrow_and_update().clone();
                let marker = match snap.urgency {
                    Urgency::Critical => " !!",
                    Urgency::Warning => " !",
                    Urgency::Normal => "",
                };
                println!("{}{}", snap.display, marker);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelled with {} left.", widget.snapshot().display);
                break;
            }
        }
    }
    Ok(())
}
