use sqlx::PgPool;

/// Create the trade tables and their indexes. Safe to run against an existing schema.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../../sql/schema.sql"))
        .execute(pool)
        .await?;
    tracing::debug!("trade schema migrated");
    Ok(())
}
