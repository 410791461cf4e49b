//! meal-assistant - A conversational meal-tracking assistant.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing::{error, info};

use meal_assistant::agent::Workflow;
use meal_assistant::cli::Cli;
use meal_assistant::config::Config;
use meal_assistant::db::{DatabaseClient, MealDb};
use meal_assistant::llm::create_client;
use meal_assistant::logging::{self, TranscriptLog};
use meal_assistant::repl;
use meal_assistant::session::{self, ChatSession, ReplyStyle};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if cli.log_stderr {
        logging::init_stderr_logging();
    } else {
        logging::init_file_logging(&config.logging.resolved_log_dir());
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = cli.config_path();
    let mut config = Config::load_from_file(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    cli.apply_overrides(&mut config)?;
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path();
    info!(path = %db_path.display(), "Opening meal database");
    let db = Arc::new(
        MealDb::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?,
    );

    let client = create_client(&config.llm).context("Failed to create LLM client")?;
    let transcript = if config.logging.transcript {
        Some(Arc::new(TranscriptLog::open(&config.logging.resolved_log_dir())?))
    } else {
        None
    };

    let workflow = Workflow::from_config(&config, client, db.clone(), transcript)?;
    let style: ReplyStyle = config.chat.style.parse()?;
    let user_name = cli.user.clone().unwrap_or_default();

    match &cli.message {
        // Without a user the turn goes straight to the workflow, which asks
        // the model to pick a name.
        Some(message) if user_name.trim().is_empty() => {
            let outcome = session::login_turn(&workflow, db.pool(), message).await?;
            println!("{}", outcome.message);
            if !outcome.user_name.is_empty() {
                println!("用户名: {}", outcome.user_name);
            }
        }
        Some(message) => {
            let mut session = ChatSession::new(workflow, db.pool().clone(), config.chat.history_limit)
                .with_style(style)
                .with_user(user_name);
            for reply in session.send(message).await {
                println!("{reply}");
            }
        }
        None => {
            let mut session = ChatSession::new(workflow, db.pool().clone(), config.chat.history_limit)
                .with_style(style)
                .with_user(user_name);
            repl::run(
                &mut session,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await
            .context("Chat loop failed")?;
        }
    }

    db.close().await?;
    Ok(())
}
