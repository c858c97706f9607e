use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use synchron_core::config::SynchronConfig;
use synchron_core::{Credential, NewSyncConfig, OwnerId, SyncConfigId, SyncConfigUpdate};
use synchron_scheduler::{build, Dispatcher, SyncService};
use synchron_sheets::GoogleSheetsClient;
use synchron_store::{SqliteCredentialStore, SqliteSyncConfigStore};
use tracing::info;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synchron=info,synchron_scheduler=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // explicit --config > SYNCHRON_CONFIG env > ~/.synchron/synchron.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("SYNCHRON_CONFIG").ok());
    let config = SynchronConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        SynchronConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    synchron_store::db::init_db(&db)?;
    drop(db);

    // each store gets its own connection
    let store = Arc::new(SqliteSyncConfigStore::new(rusqlite::Connection::open(db_path)?)?);
    let credentials = Arc::new(SqliteCredentialStore::new(
        rusqlite::Connection::open(db_path)?,
    )?);
    let source = Arc::new(GoogleSheetsClient::new(&config.google)?);

    let (service, dispatcher) = build(store, credentials.clone(), source, &config.scheduler);

    match cli.command {
        Command::Run => run(service, dispatcher).await,
        Command::List { owner } => {
            let configs = match owner {
                Some(owner) => service.list_configs(&OwnerId::from(owner))?,
                None => service.list_all_configs()?,
            };
            print_json(&configs)
        }
        Command::Create {
            owner,
            name,
            sheet_id,
            sheet_name,
            tab,
            path,
            interval,
            inactive,
        } => {
            let result = service
                .create_and_schedule(NewSyncConfig {
                    owner_id: owner.into(),
                    name,
                    sheet_id,
                    sheet_name,
                    tab_name: tab,
                    local_path: path,
                    sync_interval: interval,
                    is_active: !inactive,
                })
                .await?;
            print_json(&result)
        }
        Command::Update {
            id,
            name,
            sheet_id,
            sheet_name,
            tab,
            path,
            interval,
            active,
        } => {
            let changes = SyncConfigUpdate {
                name,
                sheet_id,
                sheet_name,
                tab_name: tab,
                local_path: path,
                sync_interval: interval,
                is_active: active,
            };
            let updated = service.update_and_reschedule(&SyncConfigId::from(id), changes)?;
            print_json(&updated)
        }
        Command::Delete { id } => {
            service.delete_and_unschedule(&SyncConfigId::from(id.as_str()))?;
            print_json(&serde_json::json!({
                "message": "Sync configuration deleted successfully",
                "id": id,
            }))
        }
        Command::Trigger { id } => {
            let result = service.trigger_now(&SyncConfigId::from(id)).await?;
            print_json(&result)
        }
        Command::OwnerSet {
            id,
            access_token,
            refresh_token,
            email,
        } => {
            let id = OwnerId::from(id);
            credentials.upsert_owner(
                &id,
                email.as_deref(),
                &Credential::new(access_token, refresh_token),
            )?;
            let owner = credentials
                .get_owner(&id)?
                .ok_or_else(|| anyhow::anyhow!("owner {id} missing after upsert"))?;
            print_json(&serde_json::json!({
                "id": owner.id,
                "email": owner.email,
                "updated_at": owner.updated_at,
            }))
        }
        Command::Sources { owner } => {
            print_json(&service.list_sources(&OwnerId::from(owner)).await?)
        }
        Command::Tabs { owner, sheet_id } => {
            print_json(&service.list_tabs(&OwnerId::from(owner), &sheet_id).await?)
        }
        Command::Preview {
            owner,
            sheet_id,
            tab,
        } => print_json(
            &service
                .preview(&OwnerId::from(owner), &sheet_id, &tab)
                .await?,
        ),
    }
}

async fn run(service: SyncService, dispatcher: Dispatcher) -> anyhow::Result<()> {
    let service = Arc::new(service);
    let scheduled = service.initialize();
    info!(scheduled, "synchron running, press Ctrl-C to stop");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let dispatcher = tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    // picks up create/update/delete done by other synchron processes
    let watcher = {
        let service = service.clone();
        tokio::spawn(async move { service.watch_store(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    watcher.await?;
    service.shutdown();
    dispatcher.await?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
