//! One-time code management
//!
//! Short-lived numeric codes for password resets. At most one live code per
//! `(email, purpose)`: requesting a new code invalidates any earlier one.
//! Verification is non-consuming; only a successful password change marks
//! the code used.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;

use crate::auth::password::hash_password;
use crate::data::{
    AccountsRepository, EntityId, OneTimeCode, OneTimeCodesRepository, OtpPurpose,
};
use crate::error::{AppError, Result};
use crate::metrics::OTP_CODES_ISSUED_TOTAL;
use crate::notify::{send_best_effort, Notification, Notifier};

const CODE_LEN: usize = 6;

/// Outcome of a code request.
///
/// `delivered` is false when the notification could not be sent; the code
/// is persisted regardless so a re-request is all that is needed.
#[derive(Debug, Clone, Copy)]
pub struct OtpIssued {
    pub delivered: bool,
}

pub struct OtpService {
    codes: Arc<dyn OneTimeCodesRepository>,
    accounts: Arc<dyn AccountsRepository>,
    notifier: Arc<dyn Notifier>,
    ttl_minutes: i64,
}

fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl OtpService {
    pub fn new(
        codes: Arc<dyn OneTimeCodesRepository>,
        accounts: Arc<dyn AccountsRepository>,
        notifier: Arc<dyn Notifier>,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            codes,
            accounts,
            notifier,
            ttl_minutes,
        }
    }

    /// Issue a fresh code for the address, invalidating any prior one.
    ///
    /// An unknown address is [`AppError::NotFound`]; the HTTP layer masks
    /// that so the endpoint cannot be used to probe for registered
    /// accounts, but callers of the service see the real outcome.
    pub async fn request_code(&self, email: &str, purpose: OtpPurpose) -> Result<OtpIssued> {
        if self.accounts.get_account_by_email(email).await?.is_none() {
            tracing::debug!(purpose = purpose.as_str(), "code requested for unknown address");
            return Err(AppError::NotFound);
        }

        self.codes.delete_codes(email, purpose).await?;

        let now = Utc::now();
        let code = OneTimeCode {
            id: EntityId::new().0,
            email: email.to_string(),
            code: generate_code(),
            purpose,
            expires_at: now + Duration::minutes(self.ttl_minutes),
            is_used: false,
            created_at: now,
        };
        self.codes.insert_code(&code).await?;
        OTP_CODES_ISSUED_TOTAL.inc();

        let delivered = send_best_effort(
            self.notifier.as_ref(),
            email,
            &Notification::PasswordResetCode {
                code: code.code.clone(),
                ttl_minutes: self.ttl_minutes,
            },
        )
        .await;

        Ok(OtpIssued { delivered })
    }

    /// Check a code without consuming it.
    pub async fn verify_code(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<bool> {
        let live = self.codes.find_live(email, code, purpose, Utc::now()).await?;
        Ok(live.is_some())
    }

    /// Complete a password reset.
    ///
    /// Re-validates the code, applies the new password, then marks the code
    /// used with a conditional write. A code that was consumed concurrently
    /// or never existed yields [`AppError::InvalidOrExpired`].
    pub async fn consume_for_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let live = self
            .codes
            .find_live(email, code, OtpPurpose::PasswordReset, now)
            .await?
            .ok_or(AppError::InvalidOrExpired)?;

        let hash = hash_password(new_password)?;
        if !self.accounts.update_password_hash(email, &hash, now).await? {
            return Err(AppError::NotFound);
        }

        if !self.codes.mark_used(&live.id).await? {
            return Err(AppError::InvalidOrExpired);
        }

        Ok(())
    }
}
