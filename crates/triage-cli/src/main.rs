use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::TriageConfig;
use triage_core::session::user_turns;
use triage_core::{
    ChatMessage, GuardrailGate, LlmClassifier, LlmProvider, OpenAiCompatProvider, Session,
    ToolRegistry, TriageRouter, TurnError, TurnReply,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(version)]
#[command(about = "Product triage agent: routes manufacturing product questions to specialists")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Seed the session with history from a JSON file
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Send a one-shot message to the triage agent
    Ask {
        /// The message to send
        message: String,

        /// Seed the turn with history from a JSON file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Write the updated history to a JSON file
        #[arg(long)]
        save_history: Option<PathBuf>,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Chat { history } => cmd_chat(&cli.config, history.as_deref()).await,
        Commands::Ask {
            message,
            history,
            save_history,
        } => {
            cmd_ask(
                &cli.config,
                &message,
                history.as_deref(),
                save_history.as_deref(),
            )
            .await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Triage agent initialized at {}", config_dir.display());
    println!(
        "Set GEMINI_API_KEY or edit {} to configure your provider.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TriageConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

/// Wire the provider, guardrail and router from config
fn build_router(cfg: &TriageConfig) -> Result<Arc<TriageRouter>> {
    let api_key = cfg.provider.resolve_api_key()?;
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new(
        cfg.provider.name.clone(),
        api_key,
        cfg.provider.model.clone(),
        cfg.provider.base_url.clone(),
        cfg.provider.max_tokens,
        cfg.provider.request_timeout(),
    )?);
    info!(
        "Using provider '{}' with model {}",
        provider.provider_name(),
        provider.model()
    );

    let gate = GuardrailGate::new(Arc::new(LlmClassifier::new(provider.clone())))
        .with_malformed_policy(cfg.guardrail.on_malformed);
    let router = TriageRouter::new(provider, Arc::new(ToolRegistry::with_builtins()), gate)
        .with_config(cfg.router.clone());

    Ok(Arc::new(router))
}

/// Run one turn, bounded by the configured turn timeout.
///
/// An expired turn is dropped before it writes back, so history is unchanged.
async fn run_turn(session: &Session, cfg: &TriageConfig, message: &str) -> Result<TurnReply> {
    let turn = session.handle_message(message);
    let outcome: Result<TurnReply, TurnError> = match cfg.session.turn_timeout() {
        Some(limit) => tokio::time::timeout(limit, turn)
            .await
            .map_err(|_| anyhow!("Turn timed out after {}s", limit.as_secs()))?,
        None => turn.await,
    };
    let reply = outcome?;

    if let Some(result) = reply.result() {
        debug!(
            "Guardrail verdict: flagged={} reasoning={}",
            result.verdict.flagged, result.verdict.reasoning
        );
        debug!(
            "Turn usage: {} input tokens, {} output tokens",
            result.usage.input_tokens, result.usage.output_tokens
        );
    }
    Ok(reply)
}

async fn cmd_chat(config_path: &Option<PathBuf>, history: Option<&Path>) -> Result<()> {
    let cfg = TriageConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let seed = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let session = Session::with_history(router, seed);
    info!(
        "Chat session {} started at {}",
        session.id(),
        session.started_at().to_rfc3339()
    );

    println!("{}\n", render::WELCOME_MESSAGE);
    println!("Commands: /reset clears the conversation, /history shows it, /quit exits.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, ending session");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match message {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset().await;
                println!("Conversation cleared.\n");
                continue;
            }
            "/history" => {
                let history = session.history().await;
                println!(
                    "{} entries, {} user turns",
                    history.len(),
                    user_turns(&history)
                );
                println!("{}\n", serde_json::to_string_pretty(&history)?);
                continue;
            }
            _ => {}
        }

        match run_turn(&session, &cfg, message).await {
            Ok(reply) => println!("{}\n", render::render_reply(&reply)),
            Err(e) => {
                warn!("Turn failed: {:#}", e);
                println!("Error: {:#}\n", e);
            }
        }
    }

    info!("Chat session {} ended", session.id());
    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    message: &str,
    history: Option<&Path>,
    save_history: Option<&Path>,
) -> Result<()> {
    let cfg = TriageConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let seed = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let session = Session::with_history(router, seed);

    let reply = run_turn(&session, &cfg, message).await?;
    println!("{}", render::render_reply(&reply));

    if let Some(path) = save_history {
        save_history_file(path, &session.history().await)?;
        info!("Saved history to {}", path.display());
    }
    Ok(())
}

fn load_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file {}", path.display()))
}

fn save_history_file(path: &Path, history: &[ChatMessage]) -> Result<()> {
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write history file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = vec![
            ChatMessage::user("Estimate the cost for 100 units at 5 each"),
            ChatMessage::assistant("Total is 500."),
        ];

        save_history_file(&path, &history).unwrap();
        assert_eq!(load_history(&path).unwrap(), history);
    }

    #[test]
    fn test_history_file_accepts_plain_role_content_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();

        let history = load_history(&path).unwrap();
        assert_eq!(history, vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]);
        assert_eq!(user_turns(&history), 1);
    }

    #[test]
    fn test_missing_history_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_history(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read history file"));
    }

    #[test]
    fn test_cli_parses_ask_flags() {
        let cli = Cli::try_parse_from([
            "triage",
            "ask",
            "what does it cost?",
            "--history",
            "in.json",
            "--save-history",
            "out.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                message,
                history,
                save_history,
            } => {
                assert_eq!(message, "what does it cost?");
                assert_eq!(history, Some(PathBuf::from("in.json")));
                assert_eq!(save_history, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected ask"),
        }
    }
}
