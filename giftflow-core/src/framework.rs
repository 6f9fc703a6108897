use sqlx::PgPool;

/// Executes the query types in [`crate::entities`] against the shared pool.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
