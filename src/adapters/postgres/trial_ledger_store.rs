//! PostgreSQL implementation of TrialLedgerStore.
//!
//! The ledger table has no foreign key to user_profiles and no delete
//! path in this codebase; entries outlive the accounts that created
//! them. `create_entry` is `ON CONFLICT DO NOTHING` so the write-once
//! property holds under concurrent first-trial requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::trial::{EmailHash, TrialLedgerEntry};
use crate::ports::TrialLedgerStore;

/// PostgreSQL implementation of the TrialLedgerStore port.
pub struct PostgresTrialLedgerStore {
    pool: PgPool,
}

impl PostgresTrialLedgerStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TrialLedgerRow {
    user_id: String,
    email_hash: Option<String>,
    first_trial_date: DateTime<Utc>,
}

impl TryFrom<TrialLedgerRow> for TrialLedgerEntry {
    type Error = DomainError;

    fn try_from(row: TrialLedgerRow) -> Result<Self, Self::Error> {
        Ok(TrialLedgerEntry {
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            email_hash: row.email_hash.map(EmailHash::from_hex),
            first_trial_date: Timestamp::from_datetime(row.first_trial_date),
        })
    }
}

fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, e.to_string())
}

#[async_trait]
impl TrialLedgerStore for PostgresTrialLedgerStore {
    async fn get_entry(
        &self,
        user_id: &UserId,
    ) -> Result<Option<TrialLedgerEntry>, DomainError> {
        let row: Option<TrialLedgerRow> = sqlx::query_as(
            "SELECT user_id, email_hash, first_trial_date FROM trial_ledger WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TrialLedgerEntry::try_from).transpose()
    }

    async fn find_by_email_hash(
        &self,
        hash: &EmailHash,
    ) -> Result<Option<TrialLedgerEntry>, DomainError> {
        let row: Option<TrialLedgerRow> = sqlx::query_as(
            "SELECT user_id, email_hash, first_trial_date FROM trial_ledger WHERE email_hash = $1",
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TrialLedgerEntry::try_from).transpose()
    }

    async fn create_entry(&self, entry: &TrialLedgerEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO trial_ledger (user_id, email_hash, first_trial_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(entry.user_id.as_str())
        .bind(entry.email_hash.as_ref().map(|h| h.as_str()))
        .bind(*entry.first_trial_date.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
