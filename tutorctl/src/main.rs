//! tutorctl: command-line front end for the campus tutor chat
//!
//! Loads the pipeline configuration, installs logging and resolves
//! student messages through the tiered pipeline.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use guardrails::ContentGuard;
use tutor_agent::{ChatPipeline, InboundMessage, PipelineConfig, Transcript};

#[derive(Parser)]
#[command(name = "tutorctl")]
#[command(about = "Ask the campus tutor chatbot from the command line")]
struct Cli {
    /// Path to pipeline configuration (YAML)
    #[arg(short, long, global = true, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one message and print the answer as JSON
    Ask {
        /// Message text
        text: String,
        #[command(flatten)]
        student: StudentArgs,
    },
    /// Run the content guard only and print the verdict as JSON
    Check {
        /// Message text
        text: String,
    },
    /// Interactive session over stdin
    Chat {
        #[command(flatten)]
        student: StudentArgs,
    },
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Args)]
struct StudentArgs {
    /// Sender ID
    #[arg(long, default_value = "cli-student")]
    sender: String,

    /// Enrolled course ids, in enrollment order
    #[arg(long, value_delimiter = ',')]
    topics: Vec<String>,

    /// Display name
    #[arg(long)]
    name: Option<String>,
}

impl StudentArgs {
    fn message(&self, text: impl Into<String>) -> InboundMessage {
        let mut message = InboundMessage::new(text, &self.sender).with_topics(self.topics.clone());
        if let Some(name) = &self.name {
            message = message.with_display_name(name);
        }
        message
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("tutorctl=info,tutor_agent=info,guardrails=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Ask { text, student } => {
            let pipeline = ChatPipeline::from_config(&config)?;
            let answer = pipeline.resolve(&student.message(text)).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Check { text } => {
            let guard = match &config.guard_rules_path {
                Some(path) => ContentGuard::new(guardrails::GuardRules::load(path)?)?,
                None => ContentGuard::with_defaults()?,
            };
            println!("{}", serde_json::to_string_pretty(&guard.check(&text))?);
        }
        Command::Chat { student } => {
            let pipeline = ChatPipeline::from_config(&config)?;
            chat(&pipeline, &student).await?;
        }
        Command::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            PipelineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            info!("No config file given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

async fn chat(pipeline: &ChatPipeline, student: &StudentArgs) -> anyhow::Result<()> {
    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question. /history shows this session, /quit leaves.");

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        match text {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for (i, turn) in transcript.turns().iter().enumerate() {
                    println!(
                        "{:>3}. [{}] {} -> {}",
                        i + 1,
                        turn.at.format("%H:%M:%S"),
                        turn.question,
                        turn.answer.source_label
                    );
                }
                continue;
            }
            _ => {}
        }

        let answer = pipeline.resolve(&student.message(text)).await;
        let marker = if answer.flagged { " !" } else { "" };
        println!("tutor [{}{}]> {}", answer.source_label, marker, answer.text);
        transcript.push(text, answer);
    }

    if let Some(audit) = pipeline.audit() {
        let stats = audit.stats().await;
        info!(
            resolutions = stats.total_resolutions,
            flagged = stats.flagged,
            escalated = stats.escalated,
            avg_duration_ms = stats.avg_duration_ms,
            "Chat session ended"
        );
    }

    Ok(())
}
