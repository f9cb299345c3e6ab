use sqlx::{postgres::PgPoolOptions, PgPool};

/// Five concurrent strategies can each hold a connection mid-request, plus
/// headroom for the daily-mix genre fan-out
const MAX_CONNECTIONS: u32 = 10;

/// Creates the PostgreSQL connection pool backing the music repository
///
/// All catalog reads (taste profiles, similarity lookups, popularity pools,
/// listening history) and daily-mix upserts go through this pool.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await?;

    Ok(pool)
}
