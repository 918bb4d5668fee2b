use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chatbot_core::chat::models::LocalClock;
use chatbot_core::chat::repositories::{KeyringTranscriptBackup, SessionFileRepository};
use chatbot_core::chat::services::{Device, EngineHandle, OllamaBackend};
use chatbot_core::settings::repositories::{
    GeneralSettingsJsonRepository, GeneralSettingsRepository,
};
use chatbot_core::{
    ChatController, ControllerError, DispatchQueue, DispatchTask, GeneralSettingsModel,
    SessionStore, SubmitOutcome,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

mod commands;
mod terminal_presenter;

use commands::Command;
use terminal_presenter::TerminalPresenter;

#[derive(Parser)]
#[command(name = "chatbots")]
#[command(about = "Chat with a local language model from the terminal", long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/chatbots/general_settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model to load, e.g. gemma3:4b
    #[arg(long)]
    model: Option<String>,

    /// Device to run the model on (cpu or gpu)
    #[arg(long)]
    device: Option<Device>,

    /// Directory holding saved chats
    #[arg(long)]
    chats_dir: Option<PathBuf>,

    /// Base URL of the Ollama server
    #[arg(long)]
    engine_url: Option<String>,

    /// Upper bound on generated tokens per response
    #[arg(long)]
    max_new_tokens: Option<u32>,

    /// Log filter, e.g. debug or chatbot_core=trace (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut GeneralSettingsModel) {
        if let Some(model) = &self.model {
            settings.model_id = model.clone();
        }
        if let Some(device) = self.device {
            settings.device = device;
        }
        if let Some(dir) = &self.chats_dir {
            settings.chats_dir = Some(dir.clone());
        }
        if let Some(url) = &self.engine_url {
            settings.engine_url = url.clone();
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            settings.max_new_tokens = max_new_tokens;
        }
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(directive) => tracing_subscriber::EnvFilter::new(directive),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    // stdout carries the conversation
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_settings(cli: &Cli) -> Result<GeneralSettingsModel> {
    let repo = match &cli.config {
        Some(path) => GeneralSettingsJsonRepository::with_path(path),
        None => GeneralSettingsJsonRepository::new()?,
    };

    let mut settings = match repo.load().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = ?e, "Failed to load settings, using defaults");
            GeneralSettingsModel::default()
        }
    };
    cli.apply_overrides(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let settings = load_settings(&cli).await?;

    let sessions = match &settings.chats_dir {
        Some(dir) => SessionFileRepository::with_dir(dir),
        None => SessionFileRepository::new()?,
    };
    info!(chats_dir = %sessions.chats_dir().display(), "Using chats directory");
    let store = SessionStore::new(
        Arc::new(sessions),
        Arc::new(KeyringTranscriptBackup::new()),
        Box::new(LocalClock),
    );

    let backend = OllamaBackend::new(
        settings.engine_url.clone(),
        tokio::runtime::Handle::current(),
    );
    let engine = EngineHandle::initialize(
        Arc::new(backend),
        settings.model_id.clone(),
        settings.device,
    );

    let (dispatch, mut queue) = DispatchQueue::channel();
    let mut presenter = TerminalPresenter::new(std::io::stdout());
    presenter.notice("type /help for commands");

    let mut controller = ChatController::start(
        store,
        engine,
        dispatch,
        settings.generation_config(),
        &mut presenter,
    )
    .await;
    if settings.open_sidebar_when_launched {
        presenter.print_sessions();
    }
    presenter.prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match commands::parse(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        presenter.notice(&e.to_string());
                        continue;
                    }
                };
                if matches!(command, Command::Quit) {
                    break;
                }
                run_command(&mut controller, command, &mut presenter).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            Some(task) = queue.next() => {
                let finishes_turn = matches!(task, DispatchTask::Finalize(_));
                controller.apply(task, &mut presenter).await;
                if finishes_turn && presenter.submit_enabled() {
                    presenter.prompt();
                }
            }
        }
    }

    controller.shutdown(&mut queue, &mut presenter).await;
    presenter.notice("bye");
    Ok(())
}

async fn run_command(
    controller: &mut ChatController,
    command: Command,
    presenter: &mut TerminalPresenter<std::io::Stdout>,
) {
    let result = match command {
        Command::Prompt(text) => controller.submit(&text, presenter).await.map(|outcome| {
            if let SubmitOutcome::Started(id) = outcome {
                debug!(generation_id = id.0, "Generation started");
            }
        }),
        Command::NewChat => controller.new_chat(presenter).await.map(|_| ()),
        Command::List => {
            presenter.print_sessions();
            Ok(())
        }
        Command::Open(id) => controller.open_session(&id, presenter).await,
        Command::Delete(ids) => controller.delete_sessions(&ids, presenter).await,
        Command::Help => {
            presenter.notice(commands::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    match result {
        Ok(()) => {}
        Err(ControllerError::GenerationInFlight) => {
            presenter.notice("still answering, wait for the response to finish");
        }
        Err(e) => presenter.notice(&e.to_string()),
    }

    // Otherwise the prompt returns when the response finishes
    if !controller.is_generating() {
        presenter.prompt();
    }
}
