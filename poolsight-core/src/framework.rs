use sqlx::PgPool;

/// Executes entity queries against the connection pool.
///
/// Queries are plain structs; each one is served by an implementation of
/// `kanau::processor::Processor` for this type.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Start a transaction for multi-statement writes.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}
