//! `PostgreSQL` identity store backed by the `app_users` table (see `sql/schema.sql`).

use super::{check_arguments, new_user, AppUser, IdentityError, IdentityStore};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::{debug, Instrument};

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    fn backend(&self) -> &'static str {
        "postgresql"
    }

    async fn ping(&self) -> Result<(), IdentityError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }

    async fn find(
        &self,
        idp_name: &str,
        idp_subject: &str,
    ) -> Result<Option<AppUser>, IdentityError> {
        check_arguments(idp_name, idp_subject, None)?;
        let query = r"
            SELECT id, idp_name, idp_subject, display_name
            FROM app_users
            WHERE idp_name = $1 AND idp_subject = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(idp_name)
            .bind(idp_subject)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| AppUser {
            id: row.get("id"),
            idp_name: row.get("idp_name"),
            idp_subject: row.get("idp_subject"),
            display_name: row.get("display_name"),
        }))
    }

    async fn create(
        &self,
        idp_name: &str,
        idp_subject: &str,
        display_name: &str,
    ) -> Result<AppUser, IdentityError> {
        check_arguments(idp_name, idp_subject, Some(display_name))?;
        let user = new_user(idp_name, idp_subject, display_name);
        let query = r"
            INSERT INTO app_users (id, idp_name, idp_subject, display_name)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.idp_name)
            .bind(&user.idp_subject)
            .bind(&user.display_name)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => {
                debug!(user_id = %user.id, "Recorded application user");
                Ok(user)
            }
            Err(err) if is_unique_violation(&err) => Err(IdentityError::DuplicateIdentity {
                idp_name: user.idp_name,
                idp_subject: user.idp_subject,
            }),
            Err(err) => Err(IdentityError::Database(err)),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use sqlx::error::{DatabaseError, ErrorKind};
    use sqlx::postgres::PgPoolOptions;
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;
    use uuid::Uuid;

    const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("40001"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    /// Connect to the database named by `HANDOFF_TEST_DSN`, or skip.
    async fn test_store() -> Result<Option<PgIdentityStore>> {
        let Ok(dsn) = std::env::var("HANDOFF_TEST_DSN") else {
            eprintln!("Skipping integration test: HANDOFF_TEST_DSN is not set");
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to apply schema")?;
        Ok(Some(PgIdentityStore::new(pool)))
    }

    #[tokio::test]
    async fn postgres_create_find_and_duplicate() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let subject = Uuid::new_v4().to_string();

        assert_eq!(store.find("oidc", &subject).await?, None);
        let user = store.create("oidc", &subject, "Alice Smith").await?;
        assert_eq!(store.find("oidc", &subject).await?, Some(user));

        let duplicate = store.create("oidc", &subject, "Alice Again").await;
        assert!(matches!(
            duplicate,
            Err(IdentityError::DuplicateIdentity { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn postgres_concurrent_creates_yield_one_record() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let subject = Uuid::new_v4().to_string();

        let (first, second) = tokio::join!(
            store.create("oidc", &subject, "First Tab"),
            store.create("oidc", &subject, "Second Tab"),
        );
        assert_eq!(u8::from(first.is_ok()) + u8::from(second.is_ok()), 1);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM app_users WHERE idp_name = $1 AND idp_subject = $2",
        )
        .bind("oidc")
        .bind(&subject)
        .fetch_one(store.pool())
        .await?;
        assert_eq!(count, 1);
        Ok(())
    }
}
