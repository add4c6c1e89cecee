use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS children (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL,
        name        TEXT NOT NULL,
        birthdate   DATE NOT NULL,
        color       TEXT NOT NULL,
        photo_url   TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bits (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL,
        child_id    UUID REFERENCES children(id) ON DELETE SET NULL,
        text        TEXT NOT NULL,
        context     TEXT,
        photo_url   TEXT,
        bit_date    DATE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS bits_timeline_idx ON bits (user_id, bit_date DESC, created_at DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS milestones (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL,
        name        TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_id, name)
    )
    "#,
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the `children`, `bits` and `milestones` tables if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = SCHEMA.len(), "Schema ensured");
    Ok(())
}
