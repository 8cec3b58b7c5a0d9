use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use log::{error, info, warn};
use rand::rngs::OsRng;
use thiserror::Error;
use yamdb_core::{Role, User};

use crate::{
    users::username_for_email,
    util::{random_code, random_string},
    CollabContext, DatabaseError, Mail, MailError, NewChallenge, NewSession, NewUser, SessionData,
};

pub const CHALLENGE_SUBJECT: &str = "yamdb: your confirmation code";

/// Passwordless authentication.
///
/// A user requests a challenge for their email, receives a one-time code by mail,
/// and exchanges the code for a session. Only a hash of the code is stored.
/// A challenge can be redeemed once, before it expires, and requesting a new one
/// invalidates the previous one.
pub struct Auth {
    context: CollabContext,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The code is wrong, expired, or already used
    #[error("Invalid confirmation code")]
    InvalidCode,
    #[error("No account is registered with {0}")]
    UnknownEmail(String),
    /// The session token doesn't exist or has expired
    #[error("Session does not exist or has expired")]
    InvalidSession,
    /// The code could not be delivered
    #[error(transparent)]
    Delivery(MailError),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: i64 = 7;
    const SESSION_TOKEN_LENGTH: usize = 32;
    const CODE_LENGTH: usize = 6;
    const USERNAME_ATTEMPTS: usize = 3;
    /// Wrong codes a challenge survives before it is used up
    const MAX_FAILED_ATTEMPTS: i32 = 5;

    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Sends a one-time code to the email, creating an account for it if needed.
    /// The outcome is the same whether the account existed or not.
    pub async fn issue_challenge(&self, email: &str) -> Result<(), AuthError> {
        let user = self.ensure_account(email).await?;

        let code = random_code(Self::CODE_LENGTH);
        let salt = SaltString::generate(&mut OsRng);
        let code_hash = self
            .argon
            .hash_password(code.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.context
            .database
            .create_challenge(NewChallenge {
                user_id: user.id,
                code_hash,
                expires_at: Utc::now() + self.context.config.challenge_ttl,
            })
            .await
            .map_err(AuthError::Db)?;

        let mail = Mail {
            to: user.email.clone(),
            subject: CHALLENGE_SUBJECT.to_string(),
            body: format!("Thank you for registration. Your code: {code}"),
        };

        self.context.mailer.send(mail).await.map_err(|e| {
            error!("Confirmation code for user {} was not delivered: {}", user.id, e);
            AuthError::Delivery(e)
        })?;

        info!("Issued a challenge for user {}", user.id);
        Ok(())
    }

    /// Returns the account registered with the email, creating a regular user if there
    /// is none. The email becomes the username when it is a valid one, otherwise a
    /// username is derived from it.
    pub async fn ensure_account(&self, email: &str) -> Result<User, AuthError> {
        let database = &self.context.database;

        match database.user_by_email(email).await {
            Ok(user) => return Ok(user),
            Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(AuthError::Db(e)),
        }

        let mut username = username_for_email(email, false);

        for attempt in 1..=Self::USERNAME_ATTEMPTS {
            let result = database
                .create_user(NewUser {
                    username,
                    email: email.to_string(),
                    role: Role::User,
                    first_name: String::new(),
                    last_name: String::new(),
                    bio: String::new(),
                })
                .await;

            match result {
                Ok(user) => {
                    info!("Created account {} on first challenge request", user.id);
                    return Ok(user);
                }
                // Created by a concurrent request
                Err(DatabaseError::Conflict { field: "email", .. }) => {
                    return database.user_by_email(email).await.map_err(AuthError::Db)
                }
                Err(DatabaseError::Conflict {
                    field: "username", ..
                }) if attempt < Self::USERNAME_ATTEMPTS => {
                    username = username_for_email(email, true);
                }
                Err(e) => return Err(AuthError::Db(e)),
            }
        }

        Err(AuthError::Db(DatabaseError::Internal(
            format!("No free username for {email}").into(),
        )))
    }

    /// Makes the account registered with the email a superuser, creating it if needed.
    /// This is the only way to grant the platform-level flags.
    pub async fn register_superuser(&self, email: &str) -> Result<User, AuthError> {
        let user = self.ensure_account(email).await?;

        if user.staff && user.superuser {
            return Ok(user);
        }

        let user = self
            .context
            .database
            .set_platform_flags(user.id, true, true)
            .await
            .map_err(AuthError::Db)?;

        info!("Registered user {} as a superuser", user.id);
        Ok(user)
    }

    /// Exchanges a one-time code for a new session
    pub async fn redeem_challenge(&self, email: &str, code: &str) -> Result<SessionData, AuthError> {
        let database = &self.context.database;

        let user = database.user_by_email(email).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::UnknownEmail(email.to_string()),
            e => AuthError::Db(e),
        })?;

        let now = Utc::now();
        let challenge = database
            .live_challenge(user.id, now)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCode,
                e => AuthError::Db(e),
            })?;

        let stored_code = PasswordHash::parse(&challenge.code_hash, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        let verified = self
            .argon
            .verify_password(code.trim().to_uppercase().as_bytes(), &stored_code)
            .is_ok();

        if !verified {
            let challenge = database
                .fail_challenge(challenge.id, Self::MAX_FAILED_ATTEMPTS, now)
                .await
                .map_err(AuthError::Db)?;

            if challenge.failed_attempts >= Self::MAX_FAILED_ATTEMPTS {
                warn!(
                    "Challenge {} of user {} was used up by wrong codes",
                    challenge.id, user.id
                );
            }

            return Err(AuthError::InvalidCode);
        }

        // Someone else may have redeemed it in the meantime
        let consumed = database
            .consume_challenge(challenge.id, now)
            .await
            .map_err(AuthError::Db)?;

        if !consumed {
            return Err(AuthError::InvalidCode);
        }

        self.clear_expired().await?;

        let session = database
            .create_session(NewSession {
                token: random_string(Self::SESSION_TOKEN_LENGTH),
                user_id: user.id,
                expires_at: now + Duration::days(Self::SESSION_DURATION_IN_DAYS),
            })
            .await
            .map_err(AuthError::Db)?;

        info!("Issued a session for user {}", user.id);
        Ok(session)
    }

    /// Returns a session if it exists and hasn't expired.
    /// The user of the session is always read fresh from the database.
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self
            .context
            .database
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidSession,
                e => AuthError::Db(e),
            })?;

        if session.expires_at <= Utc::now() {
            return Err(AuthError::InvalidSession);
        }

        Ok(session)
    }

    async fn clear_expired(&self) -> Result<(), AuthError> {
        self.context
            .database
            .clear_expired_sessions()
            .await
            .map_err(AuthError::Db)
    }
}

#[cfg(test)]
mod test {
    use yamdb_core::Role;

    use super::*;
    use crate::{test::test_collab, Database, NewUser, UpdatedUser};

    fn code_from(body: &str) -> String {
        body.rsplit(' ').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_challenge_creates_account() {
        let (collab, database, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();

        let user = database.user_by_email("a@x.com").await.unwrap();
        assert_eq!(user.username, "a@x.com");
        assert_eq!(user.role, Role::User);

        let mail = outbox.last_to("a@x.com").expect("code is sent");
        assert_eq!(mail.subject, CHALLENGE_SUBJECT);
        assert_eq!(code_from(&mail.body).len(), 6);

        // A second request reuses the account
        collab.auth.issue_challenge("a@x.com").await.unwrap();
        assert_eq!(database.list_users(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_account_for_long_email() {
        let (collab, database, _) = test_collab();
        let email = format!("critic@{}.com", "a".repeat(180));

        collab.auth.issue_challenge(&email).await.unwrap();

        let user = database.user_by_email(&email).await.unwrap();
        assert!(user.username.len() <= 150);
        assert!(user.username.starts_with("critic-"));
    }

    #[tokio::test]
    async fn test_account_when_email_is_taken_as_username() {
        let (collab, database, _) = test_collab();

        database
            .create_user(NewUser {
                username: "a@x.com".to_string(),
                email: "someone@x.com".to_string(),
                role: Role::User,
                first_name: String::new(),
                last_name: String::new(),
                bio: String::new(),
            })
            .await
            .unwrap();

        let user = collab.auth.ensure_account("a@x.com").await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert!(user.username.starts_with("a-"));
    }

    #[tokio::test]
    async fn test_redeem_challenge() {
        let (collab, _, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("a@x.com").unwrap().body);

        let session = collab
            .auth
            .redeem_challenge("a@x.com", &code)
            .await
            .unwrap();

        assert!(!session.token.is_empty());
        assert_eq!(session.user.email, "a@x.com");

        let resolved = collab.auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let (collab, _, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("a@x.com").unwrap().body);

        collab
            .auth
            .redeem_challenge("a@x.com", &code)
            .await
            .unwrap();

        let second = collab.auth.redeem_challenge("a@x.com", &code).await;
        assert!(matches!(second, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_new_challenge_invalidates_previous() {
        let (collab, _, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let first = code_from(&outbox.last_to("a@x.com").unwrap().body);

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let second = code_from(&outbox.last_to("a@x.com").unwrap().body);

        if first != second {
            let result = collab.auth.redeem_challenge("a@x.com", &first).await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }

        collab
            .auth
            .redeem_challenge("a@x.com", &second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected() {
        let (collab, database, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("a@x.com").unwrap().body);
        let before = database.user_by_email("a@x.com").await.unwrap();

        let wrong = if code == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };
        let result = collab.auth.redeem_challenge("a@x.com", wrong).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));

        // Nothing changed, and the right code still works
        assert_eq!(database.user_by_email("a@x.com").await.unwrap(), before);
        collab
            .auth
            .redeem_challenge("a@x.com", &code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_challenge_is_used_up_by_wrong_codes() {
        let (collab, _, outbox) = test_collab();

        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("a@x.com").unwrap().body);
        let wrong = if code == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };

        for _ in 0..5 {
            let result = collab.auth.redeem_challenge("a@x.com", wrong).await;
            assert!(matches!(result, Err(AuthError::InvalidCode)));
        }

        let result = collab.auth.redeem_challenge("a@x.com", &code).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));

        // A new challenge starts over
        collab.auth.issue_challenge("a@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("a@x.com").unwrap().body);
        collab
            .auth
            .redeem_challenge("a@x.com", &code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_superuser() {
        let (collab, database, _) = test_collab();

        let user = collab.auth.register_superuser("root@x.com").await.unwrap();
        assert!(user.staff && user.superuser);
        assert!(user.is_admin());
        assert_eq!(user.role, Role::User);

        // Running it again keeps the same account
        let again = collab.auth.register_superuser("root@x.com").await.unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(database.list_users(None).await.unwrap().len(), 1);

        let existing = collab.auth.ensure_account("critic@x.com").await.unwrap();
        assert!(!existing.is_admin());
        let promoted = collab.auth.register_superuser("critic@x.com").await.unwrap();
        assert_eq!(promoted.id, existing.id);
        assert!(promoted.is_admin());
    }

    #[tokio::test]
    async fn test_unknown_email_is_rejected() {
        let (collab, _, _) = test_collab();

        let result = collab.auth.redeem_challenge("nobody@x.com", "ABCDEF").await;
        assert!(matches!(result, Err(AuthError::UnknownEmail(_))));
    }

    #[tokio::test]
    async fn test_expired_challenge_is_rejected() {
        let (collab, database, _) = test_collab();

        let user = collab.auth.ensure_account("a@x.com").await.unwrap();
        let salt = SaltString::generate(&mut OsRng);
        let code_hash = Argon2::default()
            .hash_password(b"ABCDEF", &salt)
            .unwrap()
            .to_string();

        database
            .create_challenge(NewChallenge {
                user_id: user.id,
                code_hash,
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .await
            .unwrap();

        let result = collab.auth.redeem_challenge("a@x.com", "ABCDEF").await;
        assert!(matches!(result, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let (collab, _, outbox) = test_collab();
        outbox.set_failing(true);

        let result = collab.auth.issue_challenge("a@x.com").await;
        assert!(matches!(result, Err(AuthError::Delivery(_))));
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_session_sees_role_changes() {
        let (collab, database, outbox) = test_collab();

        let user = database
            .create_user(NewUser {
                username: "critic".to_string(),
                email: "critic@x.com".to_string(),
                role: Role::User,
                first_name: String::new(),
                last_name: String::new(),
                bio: String::new(),
            })
            .await
            .unwrap();

        collab.auth.issue_challenge("critic@x.com").await.unwrap();
        let code = code_from(&outbox.last_to("critic@x.com").unwrap().body);
        let session = collab
            .auth
            .redeem_challenge("critic@x.com", &code)
            .await
            .unwrap();

        assert!(!session.user.is_admin());

        database
            .update_user(UpdatedUser {
                id: user.id,
                role: Some(Role::Admin),
                ..Default::default()
            })
            .await
            .unwrap();

        let session = collab.auth.session(&session.token).await.unwrap();
        assert!(session.user.is_admin());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (collab, _, _) = test_collab();

        let result = collab.auth.session("nope").await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }
}
