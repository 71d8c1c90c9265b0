//! Database repository for member profiles and the subscription cache.
//!
//! The cache columns mirror processor state. Writers are explicit,
//! purpose-built methods rather than a generic update, so every place that
//! can change billing state is visible here.

use crate::billing::SubscriptionState;
use crate::db::{
    errors::{DbError, Result},
    models::profiles::{ProfileDBResponse, ProfileUpdateDBRequest},
};
use crate::types::{abbrev_uuid, UserId};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Profiles<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Profiles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create an empty profile row for a user. Called by the same factories
    /// that create the account, inside the same transaction.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create(&mut self, user_id: UserId) -> Result<ProfileDBResponse> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            "INSERT INTO profiles (user_id) VALUES ($1) RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(profile)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_by_user(&mut self, user_id: UserId) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    /// Resolve a profile by the processor's customer id (webhook path).
    #[instrument(skip(self, customer_id), err)]
    pub async fn get_by_billing_customer(&mut self, customer_id: &str) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM profiles WHERE billing_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    /// Update the user-editable fields. `None` leaves a field untouched.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn update(&mut self, user_id: UserId, request: &ProfileUpdateDBRequest) -> Result<ProfileDBResponse> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            UPDATE profiles SET
                phone_number = COALESCE($2, phone_number),
                biography = COALESCE($3, biography),
                occupation = COALESCE($4, occupation),
                city = COALESCE($5, city),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.phone_number)
        .bind(&request.biography)
        .bind(&request.occupation)
        .bind(&request.city)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(profile)
    }

    /// Record the processor customer id. Written the moment the customer is
    /// created upstream, before anything else is attempted, so a later
    /// failure never orphans the customer.
    #[instrument(skip(self, customer_id), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn set_billing_customer(&mut self, user_id: UserId, customer_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE profiles SET billing_customer_id = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Record the default payment method and its card display details.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn set_payment_method(
        &mut self,
        user_id: UserId,
        payment_method_id: &str,
        brand: Option<&str>,
        last4: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET billing_payment_method_id = $2, card_brand = $3, card_last4 = $4, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(payment_method_id)
        .bind(brand)
        .bind(last4)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Overwrite the cached subscription fields with processor state.
    #[instrument(skip(self, state), fields(user_id = %abbrev_uuid(&user_id), subscription = %state.id), err)]
    pub async fn apply_subscription_cache(&mut self, user_id: UserId, state: &SubscriptionState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE profiles SET
                billing_subscription_id = $2,
                subscription_status = $3,
                current_period_end = $4,
                cancel_at_period_end = $5,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(&state.id)
        .bind(state.status.as_str())
        .bind(state.current_period_end)
        .bind(state.cancel_at_period_end)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Update only the cached status (invoice events carry no full state).
    #[instrument(skip(self, status), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn set_subscription_status(&mut self, user_id: UserId, status: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET subscription_status = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Reset the cache to an explicit canceled state, used when the
    /// subscription no longer exists upstream. Leaves the customer id in
    /// place so the user can subscribe again without a new customer.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn clear_subscription_cache(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE profiles SET
                billing_subscription_id = NULL,
                subscription_status = 'canceled',
                current_period_end = NULL,
                cancel_at_period_end = FALSE,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }
}
