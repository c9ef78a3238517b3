//! # riskguard: risk-control support agent CLI
//!
//! Usage:
//!   riskguard chat --user user_001          # Interactive session, `q` quits
//!   riskguard ask --user user_002 "我付不了款了"
//!   riskguard ingest --rebuild              # Re-index data/sops into LanceDB
//!   riskguard evaluate --cases data/eval/cases.json

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use riskguard::rag::eval::load_cases;
use riskguard::{AgentConfig, Engine};

#[derive(Parser)]
#[command(name = "riskguard", version, about = "Risk-control customer-support agent")]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session
    Chat {
        #[arg(short, long, default_value = "user_003")]
        user: String,
    },
    /// Answer a single message
    Ask {
        #[arg(short, long, default_value = "user_003")]
        user: String,
        message: String,
    },
    /// Index the SOP markdown directory
    Ingest {
        /// Drop the existing table first
        #[arg(long)]
        rebuild: bool,
    },
    /// Score answers against ground truth with an LLM judge
    Evaluate {
        #[arg(long, default_value = "data/eval/cases.json")]
        cases: PathBuf,
        #[arg(long, default_value = "evaluation_report_custom.json")]
        out: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AgentConfig> {
    match path {
        Some(path) => AgentConfig::from_file(path).map_err(|e| anyhow!(e)),
        None => {
            let mut config = AgentConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Chat { user } => chat(config, &user).await,
        Command::Ask { user, message } => {
            let engine = Engine::new(config).await?;
            let reply = engine.graph().respond(&user, &message).await;
            println!("Agent: {}", reply);
            Ok(())
        }
        Command::Ingest { rebuild } => {
            let sop_dir = config.sop_dir.clone();
            let indexer = Engine::indexer(&config).await?;
            let report = if rebuild {
                indexer.rebuild(&sop_dir).await?
            } else {
                indexer.ingest_dir(&sop_dir).await?
            };
            println!(
                "Indexed {} files, {} chunks in {} ms",
                report.files_processed, report.total_chunks, report.duration_ms
            );
            for failed in &report.failed_files {
                println!("  failed: {}", failed);
            }
            Ok(())
        }
        Command::Evaluate { cases, out } => {
            let cases = load_cases(&cases)?;
            let engine = Engine::new(config).await?;
            let report = engine.evaluator().run(&cases).await?;

            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(&out, json)
                .with_context(|| format!("Failed to write report to {}", out.display()))?;

            println!(
                "Scored {} / {} cases. Faithfulness: {}  Accuracy: {}",
                report.scored.len(),
                cases.len(),
                fmt_mean(report.mean_faithfulness),
                fmt_mean(report.mean_accuracy)
            );
            println!("Report written to {}", out.display());
            Ok(())
        }
    }
}

async fn chat(config: AgentConfig, user: &str) -> Result<()> {
    let engine = Engine::new(config).await?;
    println!("Risk-control support agent. Current user: {} (type q to quit)", user);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nUser: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if is_quit(message) {
            break;
        }

        let reply = engine.graph().respond(user, message).await;
        println!("Agent: {}", reply);
    }
    Ok(())
}

fn is_quit(message: &str) -> bool {
    message.eq_ignore_ascii_case("q")
}

fn fmt_mean(mean: Option<f64>) -> String {
    mean.map(|m| format!("{:.2}", m))
        .unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_command_ignores_case() {
        assert!(is_quit("q"));
        assert!(is_quit("Q"));
        assert!(!is_quit("quit"));
        assert!(!is_quit("我要退款"));
    }

    #[test]
    fn missing_mean_prints_placeholder() {
        assert_eq!(fmt_mean(Some(0.756)), "0.76");
        assert_eq!(fmt_mean(None), "n/a");
    }
}
