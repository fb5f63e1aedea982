//! Operator CLI: enqueue merges and rehashes, drain the queue, migrate.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use regroup::{
    config::ConfigLoader,
    db,
    queue::{MergeGroupTask, RehashGroupTask, Task},
    repositories::GroupRepository,
    services::Services,
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "regroup-admin", version, about = "Group merge and rehash administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enqueue a merge of SOURCE into DESTINATION
    Merge {
        #[arg(long)]
        source: i64,
        #[arg(long)]
        destination: i64,
        /// Correlation token; generated when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Enqueue a rehash of every event in GROUP
    Rehash {
        #[arg(long)]
        group: i64,
    },
    /// Run worker batches until no due task is left
    Drain,
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let services = Services::from_config(&config, db.clone());

    match cli.command {
        Command::Merge {
            source,
            destination,
            token,
        } => {
            if source == destination {
                bail!("source and destination must differ");
            }
            for id in [source, destination] {
                if GroupRepository::find(&db, id).await?.is_none() {
                    bail!("group {} does not exist", id);
                }
            }
            let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            services
                .queue
                .submit(Task::MergeGroup(MergeGroupTask::new(
                    source,
                    destination,
                    Some(token.clone()),
                )))
                .await
                .context("enqueueing merge")?;
            println!("merge queued: {} -> {} (transaction {})", source, destination, token);
        }
        Command::Rehash { group } => {
            if GroupRepository::find(&db, group).await?.is_none() {
                bail!("group {} does not exist", group);
            }
            let token = uuid::Uuid::new_v4().to_string();
            services
                .queue
                .submit(Task::RehashGroupEvents(RehashGroupTask {
                    group_id: group,
                    transaction_token: Some(token.clone()),
                }))
                .await
                .context("enqueueing rehash")?;
            println!("rehash queued: {} (transaction {})", group, token);
        }
        Command::Drain => {
            let worker = services.worker(&config, db.clone());
            let mut total = 0;
            loop {
                let ran = worker.claim_and_run().await.context("running tasks")?;
                if ran == 0 {
                    break;
                }
                total += ran;
            }
            println!("ran {} task(s)", total);
        }
        Command::Migrate => db::run_migrations(&db).await?,
    }

    Ok(())
}
