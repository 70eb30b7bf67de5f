use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assistant_core::fragment::to_plain_text;
use assistant_core::markdown;
use assistant_core::session::FAILURE_MESSAGE;
use assistant_core::{
    Attachment, BackendClient, ChatRole, ChatSession, Config, Draft, Narrator, SendOutcome,
    SystemSpeech,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

const DEFAULT_LOG_FILTER: &str = "gemini_assistant=info,assistant_core=info";

#[derive(Parser)]
#[command(name = "gemini-chat")]
#[command(version)]
#[command(about = "Chat with the Gemini Assistant backend, summarize documents and listen to replies")]
struct Cli {
    /// Backend base URL (overrides GEMINI_ASSISTANT_URL and the config file)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        prompt: String,
        /// Print the rendered HTML fragment instead of plain text
        #[arg(long)]
        html: bool,
    },
    /// Summarize a .pdf, .txt or .docx document
    Summarize {
        /// Path to the document
        file: PathBuf,
    },
    /// Render markdown from stdin to an HTML fragment
    Render,
    /// List the models the backend reports
    Models,
    /// List the text-to-speech voices on this machine
    Voices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = Config::load();
    init_logging();

    // A file we could not read is never written back
    let (config, config_path) = match loaded {
        Ok(config) => (config, Config::path().ok()),
        Err(err) => {
            warn!(error = %err, "could not load config, using defaults and leaving the file untouched");
            eprintln!("{}: {}", "Ignoring unreadable config".yellow(), err);
            (Config::new(), None)
        }
    };

    let backend_url = cli.url.clone().unwrap_or_else(|| config.backend_url());
    info!(backend = %backend_url, "starting");

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_tui(config, config_path, &backend_url).await?,
        Commands::Ask { prompt, html } => ask(&backend_url, &prompt, html).await?,
        Commands::Summarize { file } => summarize(&backend_url, &file).await?,
        Commands::Render => render_stdin()?,
        Commands::Models => list_models(&backend_url).await?,
        Commands::Voices => list_voices(&config),
    }

    Ok(())
}

/// Logs go to a file so they never draw over the terminal UI
fn init_logging() {
    let Ok(dir) = Config::config_dir() else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::File::create(dir.join("gemini-chat.log")) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
}

async fn run_tui(config: Config, config_path: Option<PathBuf>, backend_url: &str) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(config, config_path, backend_url);
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    app.narrator.stop();
    tui::restore()?;
    result
}

/// Send one draft and wait for the transcript to settle
async fn exchange(backend_url: &str, draft: Draft) -> Result<String> {
    let mut session = ChatSession::new(BackendClient::new(backend_url));
    if session.send(draft) == SendOutcome::Empty {
        bail!("Nothing to send");
    }
    session.wait_for_response().await;

    let reply = session
        .transcript()
        .last()
        .filter(|m| m.role() == ChatRole::Assistant)
        .context("No reply recorded")?;
    if reply.is_error() {
        bail!(FAILURE_MESSAGE);
    }
    Ok(reply.raw_text().to_string())
}

fn print_reply(raw: &str, html: bool) {
    let fragment = markdown::render(raw);
    if html {
        println!("{}", fragment);
    } else {
        println!("{}", to_plain_text(&fragment));
    }
}

async fn ask(backend_url: &str, prompt: &str, html: bool) -> Result<()> {
    if !html {
        println!("💬 {}\n", prompt.bold().cyan());
    }
    match exchange(backend_url, Draft::text(prompt)).await {
        Ok(reply) => {
            print_reply(&reply, html);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            eprintln!("Backend: {}", backend_url.bold());
            Err(e)
        }
    }
}

async fn summarize(backend_url: &str, file: &Path) -> Result<()> {
    let attachment = Attachment::load(file)?;
    println!(
        "📎 Summarizing {} ({})\n",
        attachment.name().bold().cyan(),
        attachment.size_label().dimmed()
    );

    let reply = exchange(backend_url, Draft::document(attachment)).await?;
    println!("{}", "Summary:".bold().green());
    print_reply(&reply, false);
    Ok(())
}

fn render_stdin() -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read markdown from stdin")?;
    println!("{}", markdown::render(&input));
    Ok(())
}

async fn list_models(backend_url: &str) -> Result<()> {
    let client = BackendClient::new(backend_url);

    println!("\n{}", "🤖 Available Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    match client.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!("{}", "The backend did not report any models".yellow());
            } else {
                for model in models {
                    println!("  • {}", model.green());
                }
            }
        }
        Err(e) => {
            println!("{}: {}", "Error connecting to the backend".red(), e);
            println!("Backend: {}", backend_url.bold());
        }
    }

    Ok(())
}

fn list_voices(config: &Config) {
    let mut narrator = Narrator::new(Box::new(SystemSpeech::detect()));
    if let Some(name) = config.preferred_voice.as_deref() {
        narrator.select_voice_by_name(name);
    }
    let selected = narrator.selected_index();

    println!("\n{}", "🔊 Available Voices".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    let voices = narrator.voices();
    if voices.is_empty() {
        println!(
            "{}",
            "No voices found. Install espeak-ng (Linux) or use macOS `say`.".yellow()
        );
        return;
    }

    for (i, voice) in voices.iter().enumerate() {
        let marker = if Some(i) == selected { "▶" } else { " " };
        let local = if voice.is_local { "" } else { " (remote)" };
        println!(
            "{} {} {}{}",
            marker.green(),
            voice.name.bold(),
            voice.lang.dimmed(),
            local.dimmed()
        );
    }
}
