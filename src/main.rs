use mimalloc::MiMalloc;
use roost::Storage;
use roost::db::sqlite::{SqliteStorage, connect};
use roost::db::{Row, ensure_user_table};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &roost::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        table = %cfg.users.table,
        loglevel = %cfg.loglevel
    );

    let pool = connect(&cfg.database_url).await?;
    let storage = SqliteStorage::new(pool);

    let outcome = ensure_user_table(&storage, &cfg.users).await?;
    info!(?outcome, table = %cfg.users.table, "user table reconciled");

    let users = storage.select(&cfg.users.table, &Row::new()).await?;
    info!(count = users.len(), "users on record");
    Ok(())
}
