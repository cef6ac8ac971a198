//! genie binary entry point

use std::io;

use color_eyre::{eyre::WrapErr, Result};
use genie_stream::{
    cli::{replay_body, trust_summary, Cli, Commands, EchoSink},
    config::Config,
    messages::Conversation,
    services::{ChatClient, ChatOptions},
    streaming::{AssemblyOutcome, StreamControl},
    trust::shows_trust_indicators,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let filter = if cli.verbose {
        EnvFilter::new("genie_stream=debug,genie=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Some(Commands::Chat {
            prompt,
            surface,
            mode,
        }) => {
            let config = Config::load()?;
            let surface = surface.unwrap_or(config.global.default_surface);
            let options = ChatOptions {
                memory_context: config.project.memory_context.clone(),
                document_context: config.project.document_context.clone(),
                user_context: config.project.user_context.clone(),
                ..ChatOptions::new(surface)
                    .with_mode(mode.unwrap_or_else(|| config.global.default_mode.clone()))
            };

            let client = ChatClient::from_config(&config)?;
            let control = StreamControl::default();
            let cancel = control.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let mut sink = EchoSink::new(Conversation::new(), io::stdout());
            let turn = client
                .send(&mut sink, &prompt, &options, &control)
                .await
                .wrap_err("Chat request failed")?;

            if turn.metadata.is_some() || shows_trust_indicators(&turn.text) {
                let (conversation, _) = sink.into_inner();
                if let Some(last) = conversation.last() {
                    let trust = last.effective_trust(Some(options.effective_mode()));
                    println!("\n{}", trust_summary(&trust, last.metadata.is_some()));
                }
            }
        }
        Some(Commands::Replay {
            file,
            chunk_size,
            surface,
            mode,
        }) => {
            let body = std::fs::read(&file)
                .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
            let config = Config::load()?;
            let chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
            let replay = replay_body(&body, chunk_size, config.stream_profile(surface));

            eprintln!(
                "{} chunks, {} lines, {} deltas, {} malformed recovered, {} dropped",
                replay.stats.chunks,
                replay.stats.lines,
                replay.stats.content_deltas,
                replay.stats.malformed_recovered,
                replay.stats.malformed_dropped,
            );
            match replay.outcome {
                AssemblyOutcome::Completed(turn) => {
                    println!("{}", turn.text);
                    if let Some(last) = replay.conversation.last() {
                        let mode = surface.fixed_mode().or(mode.as_deref());
                        let trust = last.effective_trust(mode);
                        println!("\n{}", trust_summary(&trust, turn.metadata.is_some()));
                    }
                }
                AssemblyOutcome::Empty => {
                    println!("(no content)");
                }
            }
        }
        Some(Commands::Config { list, init }) => {
            let mut config = Config::load()?;
            if init {
                let path = Config::global_config_path();
                if path.exists() {
                    println!("Config already exists: {}", path.display());
                } else {
                    let mut global = config.global.clone();
                    global.access_token = None;
                    global.save().wrap_err("Failed to write config")?;
                    println!("Wrote {}", path.display());
                }
                return Ok(());
            }
            if config.global.access_token.is_some() {
                config.global.access_token = Some("********".to_string());
            }
            if list {
                println!("{}", serde_json::to_string_pretty(&config)?);
                println!("memory_context: {}", config.project.memory_context.is_some());
                println!("document_context: {}", config.project.document_context.is_some());
                println!("user_context: {}", config.project.user_context.is_some());
            } else {
                println!("Global config: {}", Config::global_config_path().display());
                println!("Project config: {}", Config::project_config_path().display());
                match config.validate() {
                    Ok(()) => println!("Configuration is valid"),
                    Err(err) => println!("{err}"),
                }
            }
        }
        None => {
            println!("genie {}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for more information");
        }
    }

    Ok(())
}
