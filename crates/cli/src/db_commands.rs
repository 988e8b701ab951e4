use std::path::{Path, PathBuf};

use {anyhow::Context, clap::Subcommand, courier_store::SqliteMessageStore};

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// Delete stored messages but keep the schema intact.
    Clear {
        /// Only clear this session's history.
        #[arg(long)]
        session: Option<String>,
    },
    /// Delete the default database file completely.
    Reset,
}

pub async fn handle_db(action: DbAction) -> anyhow::Result<()> {
    let config = courier_config::discover_and_load();
    match action {
        DbAction::Migrate => {
            open_store(&config).await?;
            println!("Migrations applied.");
            Ok(())
        },
        DbAction::Clear { session } => clear_messages(&config, session.as_deref()).await,
        DbAction::Reset => reset_database(&config),
    }
}

/// Open the configured store, which runs pending migrations.
async fn open_store(config: &courier_config::CourierConfig) -> anyhow::Result<SqliteMessageStore> {
    if config.database.url.is_none() {
        std::fs::create_dir_all(courier_config::data_dir())
            .context("failed to create data directory")?;
    }
    let url = courier_config::database_url(config);
    SqliteMessageStore::connect(&url)
        .await
        .with_context(|| format!("failed to open message store at {url}"))
}

async fn clear_messages(
    config: &courier_config::CourierConfig,
    session: Option<&str>,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let result = match session {
        Some(session_id) => {
            sqlx::query("DELETE FROM messages WHERE session_id = ?")
                .bind(session_id)
                .execute(store.pool())
                .await?
        },
        None => sqlx::query("DELETE FROM messages").execute(store.pool()).await?,
    };
    store.pool().close().await;
    println!("Deleted {} message(s).", result.rows_affected());
    Ok(())
}

fn reset_database(config: &courier_config::CourierConfig) -> anyhow::Result<()> {
    if let Some(ref url) = config.database.url {
        anyhow::bail!("database.url is set ({url}); remove that database manually");
    }
    let deleted = remove_database_files(&courier_config::data_dir().join("courier.db"))?;
    if deleted.is_empty() {
        println!("No database files found.");
    } else {
        for path in &deleted {
            println!("Deleted: {}", path.display());
        }
        println!("Database deleted. Run `courier db migrate` to recreate it.");
    }
    Ok(())
}

/// Remove `db` together with the WAL and shared-memory files SQLite keeps
/// next to it. Returns the paths that existed.
fn remove_database_files(db: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            deleted.push(path);
        }
    }
    Ok(deleted)
}
