use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use aura_core::{Location, VoiceQueryResult};
use aura_observability::{init_tracing, AppMetrics};
use aura_pipeline::{build_pipeline, PipelineSettings, VoicePipeline};
use aura_storage::{LookupCache, QueryLogRepository, Store};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "aura")]
#[command(about = "Aura voice mobility assistant CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a text query through the full pipeline.
    Ask {
        text: String,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Answer a recorded voice query.
    Voice {
        file: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Show how a sentence is classified and which entities are extracted.
    Classify { text: String },
    /// Print the ordered classification rule table.
    Rules,
    /// Show the most recent logged queries.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete synthesized audio older than the given age and expired cache entries.
    CleanupAudio {
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
    Chat {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("aura_cli");
    let cli = Cli::parse();

    let settings = PipelineSettings::from_env()?;
    let pipeline = build_pipeline(&settings, AppMetrics::shared())
        .await
        .context("failed building the voice pipeline")?;

    match cli.command {
        Command::Ask { text, lat, lon } => {
            let result = pipeline.run_text(&text, caller(lat, lon)).await?;
            print_result(&result)?;
        }
        Command::Voice { file, lat, lon } => {
            let audio = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed reading audio from {}", file.display()))?;
            let result = pipeline.run(audio, Location::new(lat, lon)).await?;
            print_result(&result)?;
        }
        Command::Classify { text } => {
            let classification = pipeline.classifier().classify(&text);
            let entities = pipeline
                .extractor()
                .extract(&text, classification.intent, None);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "classification": classification,
                    "entities": entities,
                }))?
            );
        }
        Command::Rules => {
            for (position, rule) in pipeline.classifier().rules().iter().enumerate() {
                println!(
                    "{:>3}  {:<32} {:<20} {:.2}  {}",
                    position + 1,
                    rule.id(),
                    rule.intent().as_str(),
                    rule.tier().confidence(),
                    rule.describe()
                );
            }
        }
        Command::History { limit } => {
            let records = pipeline.store().recent(limit).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::CleanupAudio { max_age_hours } => {
            let removed = pipeline
                .audio()
                .purge_older_than(Duration::from_secs(max_age_hours * 3600))
                .await?;
            println!(
                "removed {removed} audio file(s) from {}",
                pipeline.audio().dir().display()
            );

            let expired = pipeline.store().purge_expired(chrono::Utc::now()).await?;
            println!("removed {expired} expired lookup cache entries");
        }
        Command::Chat { lat, lon } => run_chat(pipeline, caller(lat, lon)).await?,
    }

    Ok(())
}

fn caller(lat: Option<f64>, lon: Option<f64>) -> Option<Location> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
        _ => None,
    }
}

fn print_result(result: &VoiceQueryResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

async fn run_chat(pipeline: VoicePipeline<Store>, caller: Option<Location>) -> Result<()> {
    println!("Aura chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let result = pipeline.run_text(message, caller).await?;
        println!("\n{}\n", result.reply_text);

        if !result.warnings.is_empty() {
            println!("Warnings:");
            for warning in &result.warnings {
                println!("- {warning}");
            }
            println!();
        }
    }

    Ok(())
}
