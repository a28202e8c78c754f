use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use nqm_hbs::db::models::NewAgent;
use nqm_hbs::db::schema::create_tables;
use nqm_hbs::db::services::{
    evaluate_eligibility, evaluate_eligibility_at_unix, get_ping_task_state, load_targets,
    upsert_agent,
};
use nqm_hbs::server::config::HbsConfig;
use nqm_hbs::server::heartbeat::handle_heartbeat;
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;
use std::net::IpAddr;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the NQM tables if they are missing
    InitSchema,
    /// Register an agent or refresh its hostname and address
    Register {
        connection_id: String,
        hostname: String,
        ip_address: IpAddr,
    },
    /// Process one agent heartbeat: register, check eligibility, resolve targets
    Heartbeat {
        connection_id: String,
        hostname: String,
        ip_address: IpAddr,
        /// Reference time as Unix seconds, defaults to now
        #[arg(long)]
        at: Option<i64>,
    },
    /// Check (and claim) the ping round of an agent
    Evaluate {
        agent_id: i32,
        /// Reference time as Unix seconds, defaults to now
        #[arg(long)]
        at: Option<i64>,
    },
    /// Show the targets of an agent without claiming a round
    Targets { agent_id: i32 },
}

fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "hbs.log"));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    // Human-readable on stderr so stdout stays machine-readable
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = HbsConfig::load(args.config.as_deref())?;
    let _log_guard = init_logging(&config.log_dir);
    info!("Starting nqm-hbs, version: {}", env!("CARGO_PKG_VERSION"));

    let db: DatabaseConnection = match Database::connect(config.connect_options()).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to create database connection");
            return Err(e.into());
        }
    };

    if let Err(e) = run(&db, args.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

async fn run(
    db: &DatabaseConnection,
    command: Command,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        Command::InitSchema => {
            create_tables(db).await?;
            info!("Schema is up to date");
        }
        Command::Register {
            connection_id,
            hostname,
            ip_address,
        } => {
            let new_agent = NewAgent::new(connection_id, hostname, ip_address);
            let agent_id = upsert_agent(db, &new_agent).await?;
            println!("{}", json!({ "agentId": agent_id }));
        }
        Command::Heartbeat {
            connection_id,
            hostname,
            ip_address,
            at,
        } => {
            let checked_at = match at {
                Some(secs) => DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| format!("Unix time out of range: {secs}"))?,
                None => Utc::now(),
            };
            let new_agent = NewAgent::new(connection_id, hostname, ip_address);
            let response = handle_heartbeat(db, &new_agent, checked_at).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Evaluate { agent_id, at } => {
            let eligibility = match at {
                Some(secs) => evaluate_eligibility_at_unix(db, agent_id, secs).await?,
                None => evaluate_eligibility(db, agent_id, Utc::now()).await?,
            };
            println!(
                "{}",
                json!({ "due": eligibility.is_due(), "agent": eligibility.attribution() })
            );
        }
        Command::Targets { agent_id } => {
            let state = get_ping_task_state(db, agent_id).await?;
            let targets = load_targets(db, agent_id, state).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "state": state, "targets": targets }))?
            );
        }
    }

    Ok(())
}
