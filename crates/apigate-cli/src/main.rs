//! apigate CLI - chat completions through the company gateway.
//!
//! With a prompt argument the CLI runs one completion and exits; without
//! one it opens a rustyline REPL. The gateway path activates when the
//! OIDC/gateway environment is fully configured, otherwise the session
//! falls back to the direct API-key path for the process lifetime.
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde::Deserialize;

use apigate::config::{AuthMode, DirectConfig};
use apigate::{AdapterState, Message, ModelAdapter, ReasoningEffort, Usage};

mod display;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// One-shot prompt; omit to start an interactive session
    prompt: Option<String>,

    /// Model or deployment name (defaults to the configured deployment)
    #[arg(long)]
    model: Option<String>,

    /// Reasoning effort for reasoning-capable deployments
    #[arg(long, value_parser = parse_effort)]
    reasoning_effort: Option<ReasoningEffort>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Stream responses as they arrive (default)
    #[arg(long, conflicts_with = "no_stream")]
    stream: bool,

    /// Disable streaming
    #[arg(long)]
    no_stream: bool,

    /// Log authentication attempts, resets, and retry decisions
    #[arg(long, short)]
    verbose: bool,

    /// Path to a TOML config file; flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_effort(s: &str) -> Result<ReasoningEffort, String> {
    ReasoningEffort::from_str(s).map_err(|e| e.to_string())
}

/// Optional settings mirrored from the command line.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    model: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
    temperature: Option<f32>,
    stream: Option<bool>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let file_config = args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?
        .unwrap_or_default();

    let model = args.model.clone().or(file_config.model);
    let effort = args.reasoning_effort.or(file_config.reasoning_effort);
    let temperature = args.temperature.or(file_config.temperature);
    let streaming = if args.no_stream {
        false
    } else {
        args.stream || file_config.stream.unwrap_or(true)
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    let mode = AuthMode::from_vars(&env)?;
    match &mode {
        AuthMode::Configured(_) => {
            println!("{}", "Gateway OAuth2 authentication enabled".green());
        }
        _ => {
            let missing = AuthMode::missing_vars(&env);
            println!(
                "{} missing {}; falling back to direct API access",
                "Gateway auth not configured:".yellow(),
                missing.join(", ")
            );
        }
    }

    let adapter = ModelAdapter::new(mode, DirectConfig::from_vars(&env), model)?
        .with_reasoning_effort(effort)
        .with_verbose(args.verbose);
    debug!("adapter ready, model {}", adapter.model());

    if let Some(prompt) = args.prompt {
        let messages = vec![
            Message::system("You are a helpful assistant. Be concise and informative."),
            Message::user(prompt),
        ];
        let (_, usage) = run_completion(&adapter, messages, temperature, streaming).await?;
        if let Some(usage) = usage {
            debug!("usage: {}", display::usage_summary(&usage));
        }
        return Ok(());
    }

    repl(&adapter, temperature, streaming).await
}

/// Interactive loop in the style of a chat REPL.
async fn repl(adapter: &ModelAdapter, temperature: Option<f32>, streaming: bool) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history_file = ".apigate_history";
    let _ = rl.load_history(history_file);

    println!("apigate CLI ({})", adapter.model());
    println!("Commands:");
    println!("  /list  - List messages in the conversation");
    println!("  /clear - Clear conversation (keeps system message)");
    println!("  /quit  - Exit");
    println!();

    let system_message =
        Message::system("You are a helpful assistant. Be concise and informative.");
    let mut messages = vec![system_message.clone()];

    let mut total_usage = Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        output_tokens_details: None,
    };

    loop {
        let prompt = format!(
            "\n{} [{}] > ",
            "You".bright_cyan().bold(),
            display::usage_summary(&total_usage)
        );
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                rl.add_history_entry(line)?;

                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/list" => display::list_messages(&messages),
                    "/clear" => {
                        messages = vec![system_message.clone()];
                        println!("Conversation cleared.");
                    }
                    _ if line.starts_with('/') => {
                        println!("Unknown command. Available: /list, /clear, /quit");
                    }
                    _ => {
                        messages.push(Message::user(line));
                        match run_completion(adapter, messages.clone(), temperature, streaming)
                            .await
                        {
                            Ok((reply, usage)) => {
                                messages.push(Message::assistant(reply));
                                if let Some(usage) = usage {
                                    total_usage.prompt_tokens += usage.prompt_tokens;
                                    total_usage.completion_tokens += usage.completion_tokens;
                                    total_usage.total_tokens += usage.total_tokens;
                                }
                            }
                            Err(e) => {
                                eprintln!("Error: {e}");
                                if adapter.state() == AdapterState::Failed {
                                    display::warning(
                                        "authentication session failed; restart to re-authenticate",
                                    );
                                    break;
                                }
                                messages.pop();
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {}
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    rl.save_history(history_file)?;
    println!("Goodbye!");
    Ok(())
}

/// Runs one completion, printing the reply; returns the reply content and
/// usage when reported.
async fn run_completion(
    adapter: &ModelAdapter,
    messages: Vec<Message>,
    temperature: Option<f32>,
    streaming: bool,
) -> Result<(String, Option<Usage>)> {
    if streaming {
        let (_, mut stream) = adapter
            .send_completion_stream(messages, None, temperature)
            .await?;

        display::assistant_header();
        let mut content = String::new();
        let mut usage = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(delta) = &chunk.delta_content {
                print!("{delta}");
                std::io::stdout().flush()?;
                content.push_str(delta);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }
        println!();
        Ok((content, usage))
    } else {
        let (_, response) = adapter.send_completion(messages, None, temperature).await?;
        display::assistant_header();
        println!("{}", response.message.content);
        Ok((response.message.content, response.usage))
    }
}
