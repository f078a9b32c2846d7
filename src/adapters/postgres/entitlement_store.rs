//! PostgreSQL implementation of EntitlementStore.
//!
//! The merge is a single `INSERT … ON CONFLICT DO UPDATE` statement with
//! per-field COALESCE, so unset patch fields leave stored values
//! untouched and the whole update is atomic at row granularity. The
//! expiry column needs a set-flag rather than COALESCE because lifetime
//! purchases must be able to null it out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entitlement::{
    EntitlementPatch, EntitlementRecord, MembershipStatus, ProductClass,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::EntitlementStore;

/// PostgreSQL implementation of the EntitlementStore port.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a user's entitlement fields.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: String,
    membership_status: String,
    is_premium: bool,
    product_class: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    auto_renewing: bool,
    is_lifetime: bool,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    has_used_trial: bool,
    last_validated_at: Option<DateTime<Utc>>,
    platform_account_token: Option<String>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        Ok(EntitlementRecord {
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            membership_status: parse_status(&row.membership_status)?,
            is_premium: row.is_premium,
            product_class: row.product_class.as_deref().map(parse_class).transpose()?,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            auto_renewing: row.auto_renewing,
            is_lifetime: row.is_lifetime,
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            has_used_trial: row.has_used_trial,
            last_validated_at: row.last_validated_at.map(Timestamp::from_datetime),
            platform_account_token: row.platform_account_token,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
        })
    }
}

fn parse_status(s: &str) -> Result<MembershipStatus, DomainError> {
    MembershipStatus::parse(s).ok_or_else(|| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid membership_status value: {}", s),
        )
    })
}

fn parse_class(s: &str) -> Result<ProductClass, DomainError> {
    match s {
        "monthly" => Ok(ProductClass::Monthly),
        "annual" => Ok(ProductClass::Annual),
        "lifetime" => Ok(ProductClass::Lifetime),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid product_class value: {}", s),
        )),
    }
}

fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, e.to_string())
}

const SELECT_COLUMNS: &str = r#"
    user_id, membership_status, is_premium, product_class, expires_at,
    auto_renewing, is_lifetime, trial_start, trial_end, has_used_trial,
    last_validated_at, platform_account_token, stripe_customer_id,
    stripe_subscription_id
"#;

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get_entitlement(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_profiles WHERE user_id = $1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    async fn merge_entitlement(
        &self,
        user_id: &UserId,
        patch: &EntitlementPatch,
    ) -> Result<(), DomainError> {
        let expires_set = patch.expires_at.is_some();
        let expires_value: Option<DateTime<Utc>> = patch
            .expires_at
            .flatten()
            .map(|ts| *ts.as_datetime());

        sqlx::query(
            r#"
            INSERT INTO user_profiles (
                user_id, membership_status, is_premium, product_class, expires_at,
                auto_renewing, is_lifetime, trial_start, trial_end, has_used_trial,
                last_validated_at, platform_account_token, stripe_customer_id,
                stripe_subscription_id, updated_at
            ) VALUES (
                $1,
                COALESCE($2, 'demo'),
                COALESCE($3, FALSE),
                $4,
                CASE WHEN $5 THEN $6 ELSE NULL END,
                COALESCE($7, FALSE),
                COALESCE($8, FALSE),
                $9,
                $10,
                COALESCE($11, FALSE),
                $12,
                $13,
                $14,
                $15,
                now()
            )
            ON CONFLICT (user_id) DO UPDATE SET
                membership_status = COALESCE($2, user_profiles.membership_status),
                is_premium = COALESCE($3, user_profiles.is_premium),
                product_class = COALESCE($4, user_profiles.product_class),
                expires_at = CASE WHEN $5 THEN $6 ELSE user_profiles.expires_at END,
                auto_renewing = COALESCE($7, user_profiles.auto_renewing),
                is_lifetime = COALESCE($8, user_profiles.is_lifetime),
                trial_start = COALESCE($9, user_profiles.trial_start),
                trial_end = COALESCE($10, user_profiles.trial_end),
                has_used_trial = COALESCE($11, user_profiles.has_used_trial),
                last_validated_at = COALESCE($12, user_profiles.last_validated_at),
                platform_account_token = COALESCE($13, user_profiles.platform_account_token),
                stripe_customer_id = COALESCE($14, user_profiles.stripe_customer_id),
                stripe_subscription_id = COALESCE($15, user_profiles.stripe_subscription_id),
                updated_at = now()
            "#,
        )
        .bind(user_id.as_str())
        .bind(patch.membership_status.map(|s| s.as_str()))
        .bind(patch.is_premium)
        .bind(patch.product_class.map(|c| c.as_str()))
        .bind(expires_set)
        .bind(expires_value)
        .bind(patch.auto_renewing)
        .bind(patch.is_lifetime)
        .bind(patch.trial_start.map(|ts| *ts.as_datetime()))
        .bind(patch.trial_end.map(|ts| *ts.as_datetime()))
        .bind(patch.has_used_trial)
        .bind(patch.last_validated_at.map(|ts| *ts.as_datetime()))
        .bind(patch.platform_account_token.as_deref())
        .bind(patch.stripe_customer_id.as_deref())
        .bind(patch.stripe_subscription_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_user_by_platform_account_token(
        &self,
        token: &str,
    ) -> Result<Option<UserId>, DomainError> {
        let user_id: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM user_profiles WHERE platform_account_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        user_id
            .map(|id| {
                UserId::new(id).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
                })
            })
            .transpose()
    }

    async fn find_user_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserId>, DomainError> {
        let user_id: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM user_profiles WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        user_id
            .map(|id| {
                UserId::new(id).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
                })
            })
            .transpose()
    }
}
