use std::path::PathBuf;

use clap::{Parser, Subcommand};

use jobtrail::config::TrackerConfig;
use jobtrail::engine::Engine;
use jobtrail::error::EngineError;
use jobtrail::google::gemini::GeminiClient;
use jobtrail::google::gmail::GmailMailbox;
use jobtrail::google::sheets::SheetsStore;
use jobtrail::google::RetryPolicy;
use jobtrail::seen::{default_log_path, ProcessedLog};
use jobtrail::{leads, sweep};

#[derive(Parser)]
#[command(name = "jobtrail", version, about = "Email-driven job-application tracker")]
struct Cli {
    /// Config file (default: ~/.jobtrail/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process the to-process label into the application tracker
    Run,
    /// Apply the stale-application policy to existing rows
    Sweep,
    /// Extract job postings from the leads label
    Leads,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        log::error!("{}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}

async fn execute(cli: Cli) -> Result<(), EngineError> {
    let config_path = cli.config.unwrap_or_else(TrackerConfig::default_path);
    let config = TrackerConfig::load(&config_path)?;
    let policy = RetryPolicy::default();

    match cli.command {
        Command::Run => {
            let mailbox = GmailMailbox::new(policy.clone());
            let store = SheetsStore::new(config.sheet.spreadsheet_id.clone(), policy);
            let model = gemini_client(&config)?;
            let processed = ProcessedLog::open(&default_log_path())?;

            let engine = Engine::new(&config, &mailbox, &store, &model, &processed);
            engine.run().await?;
        }
        Command::Sweep => {
            let store = SheetsStore::new(config.sheet.spreadsheet_id.clone(), policy);
            sweep::sweep(
                &store,
                &config.sheet.applications_tab,
                &config.sheet.columns,
                &config.sweep,
            )
            .await?;
        }
        Command::Leads => {
            let mailbox = GmailMailbox::new(policy.clone());
            let store = SheetsStore::new(config.sheet.spreadsheet_id.clone(), policy);
            let model = gemini_client(&config)?;

            leads::run_leads(&config, &mailbox, &store, &model).await?;
        }
    }
    Ok(())
}

fn gemini_client(config: &TrackerConfig) -> Result<GeminiClient, EngineError> {
    let api_key = std::env::var(&config.ai.api_key_env).map_err(|_| {
        EngineError::Configuration(format!(
            "environment variable {} is not set",
            config.ai.api_key_env
        ))
    })?;
    Ok(GeminiClient::new(
        config.ai.model.clone(),
        api_key,
        config.ai.max_attempts,
    ))
}
