use once_cell::sync::OnceCell;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};

static DB_CONN: OnceCell<DatabaseConnection> = OnceCell::new();

async fn table_exists(conn: &DatabaseConnection, name: &str) -> anyhow::Result<bool> {
    let sql = format!(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='{}';",
        name
    );
    let rows = conn
        .query_all(Statement::from_string(DatabaseBackend::Sqlite, sql))
        .await?;
    Ok(!rows.is_empty())
}

async fn create_table(
    conn: &DatabaseConnection,
    name: &str,
    ddl: &str,
) -> anyhow::Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    tracing::info!("Creating {} table", name);
    conn.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        ddl.to_string(),
    ))
    .await?;
    Ok(())
}

pub async fn initialize_database(db_path: Option<&str>) -> anyhow::Result<()> {
    let db_file = db_path.unwrap_or("target/db/app.db");
    if let Some(parent) = std::path::Path::new(db_file).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if std::path::Path::new(db_file).is_absolute() {
        std::path::PathBuf::from(db_file)
    } else {
        std::env::current_dir()?.join(db_file)
    };
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = absolute_path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    let db_url = format!("sqlite://{}{}?mode=rwc", prefix, normalized);
    let conn = Database::connect(&db_url).await?;

    // The primary keys are the deterministic external ids, so bulk upserts
    // always have a conflict target to land on.
    create_table(
        &conn,
        "sales_facts",
        r#"
        CREATE TABLE sales_facts (
            id TEXT PRIMARY KEY NOT NULL,
            date TEXT NOT NULL,
            brand TEXT NOT NULL,
            channel TEXT NOT NULL,
            revenue REAL NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        );
    "#,
    )
    .await?;

    create_table(
        &conn,
        "sku_facts",
        r#"
        CREATE TABLE sku_facts (
            id TEXT PRIMARY KEY NOT NULL,
            date TEXT NOT NULL,
            brand TEXT NOT NULL,
            channel TEXT NOT NULL,
            sku TEXT NOT NULL,
            units INTEGER NOT NULL DEFAULT 0,
            revenue REAL NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        );
    "#,
    )
    .await?;

    create_table(
        &conn,
        "brands",
        r#"
        CREATE TABLE brands (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            comment TEXT,
            created_at TEXT
        );
    "#,
    )
    .await?;

    create_table(
        &conn,
        "brand_targets",
        r#"
        CREATE TABLE brand_targets (
            id TEXT PRIMARY KEY NOT NULL,
            brand TEXT NOT NULL,
            period TEXT NOT NULL,
            target_revenue REAL NOT NULL DEFAULT 0
        );
    "#,
    )
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_sales_facts_date ON sales_facts(date);",
        "CREATE INDEX IF NOT EXISTS idx_sales_facts_brand ON sales_facts(brand);",
        "CREATE INDEX IF NOT EXISTS idx_sku_facts_date ON sku_facts(date);",
        "CREATE INDEX IF NOT EXISTS idx_sku_facts_brand ON sku_facts(brand);",
    ] {
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            ddl.to_string(),
        ))
        .await?;
    }

    DB_CONN
        .set(conn)
        .map_err(|_| anyhow::anyhow!("Failed to set DB_CONN"))?;
    Ok(())
}

pub fn get_connection() -> &'static DatabaseConnection {
    DB_CONN
        .get()
        .expect("Database connection has not been initialized")
}
