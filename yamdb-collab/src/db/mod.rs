use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use yamdb_core::{PrimaryKey, Role, User};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type ArcedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The persistence collaborator. Implementations must enforce the unique constraints
/// (username, email, classifier slugs, and review author + title) atomically.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<User>;
    async fn user_by_username(&self, username: &str) -> Result<User>;
    async fn user_by_email(&self, email: &str) -> Result<User>;
    async fn list_users(&self, search: Option<&str>) -> Result<Vec<User>>;
    async fn create_user(&self, new_user: NewUser) -> Result<User>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<User>;
    /// Sets the platform-level flags, which no endpoint can change
    async fn set_platform_flags(&self, user_id: PrimaryKey, staff: bool, superuser: bool)
        -> Result<User>;
    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()>;

    /// Stores a new challenge and invalidates all previous ones of the same user
    async fn create_challenge(&self, new_challenge: NewChallenge) -> Result<ChallengeData>;
    /// Returns the newest challenge of the user that is neither consumed nor expired at `now`
    async fn live_challenge(&self, user_id: PrimaryKey, now: DateTime<Utc>)
        -> Result<ChallengeData>;
    /// Marks the challenge as consumed. Returns false if it was already consumed.
    async fn consume_challenge(&self, challenge_id: PrimaryKey, now: DateTime<Utc>)
        -> Result<bool>;
    /// Counts a wrong code against the challenge, consuming it once
    /// `max_attempts` wrong codes were given
    async fn fail_challenge(
        &self,
        challenge_id: PrimaryKey,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<ChallengeData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn list_classifiers(
        &self,
        kind: Classifier,
        search: Option<&str>,
    ) -> Result<Vec<ClassifierData>>;
    async fn classifier_by_slug(&self, kind: Classifier, slug: &str) -> Result<ClassifierData>;
    async fn create_classifier(
        &self,
        kind: Classifier,
        new_classifier: NewClassifier,
    ) -> Result<ClassifierData>;
    async fn delete_classifier(&self, kind: Classifier, slug: &str) -> Result<()>;

    async fn list_titles(&self, filter: TitleFilter) -> Result<Vec<TitleData>>;
    async fn title_by_id(&self, title_id: PrimaryKey) -> Result<TitleData>;
    async fn create_title(&self, new_title: NewTitle) -> Result<TitleData>;
    async fn update_title(&self, updated_title: UpdatedTitle) -> Result<TitleData>;
    async fn delete_title(&self, title_id: PrimaryKey) -> Result<()>;

    async fn list_reviews(&self, title_id: PrimaryKey) -> Result<Vec<ReviewData>>;
    async fn review_by_id(&self, title_id: PrimaryKey, review_id: PrimaryKey)
        -> Result<ReviewData>;
    /// Fails with [DatabaseError::Conflict] if the author already reviewed the title
    async fn create_review(&self, new_review: NewReview) -> Result<ReviewData>;
    async fn update_review(&self, updated_review: UpdatedReview) -> Result<ReviewData>;
    async fn delete_review(&self, review_id: PrimaryKey) -> Result<()>;

    async fn list_comments(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> Result<Vec<CommentData>>;
    async fn comment_by_id(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
    ) -> Result<CommentData>;
    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData>;
    async fn update_comment(&self, updated_comment: UpdatedComment) -> Result<CommentData>;
    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
}

#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug)]
pub struct NewChallenge {
    pub user_id: PrimaryKey,
    /// Argon2 hash of the one-time code
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewClassifier {
    pub name: String,
    pub slug: String,
}

/// Filters for listing titles. All given filters must match.
#[derive(Debug, Default, Clone)]
pub struct TitleFilter {
    /// Exact genre slug
    pub genre: Option<String>,
    /// Exact category slug
    pub category: Option<String>,
    /// Substring of the name
    pub name: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_id: Option<PrimaryKey>,
    pub genre_ids: Vec<PrimaryKey>,
}

#[derive(Debug, Default)]
pub struct UpdatedTitle {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<Option<String>>,
    pub category_id: Option<Option<PrimaryKey>>,
    pub genre_ids: Option<Vec<PrimaryKey>>,
}

#[derive(Debug)]
pub struct NewReview {
    pub title_id: PrimaryKey,
    pub author_id: PrimaryKey,
    pub text: String,
    pub score: i32,
    /// Publication date, now if not given
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct UpdatedReview {
    pub id: PrimaryKey,
    pub text: Option<String>,
    pub score: Option<i32>,
}

#[derive(Debug)]
pub struct NewComment {
    pub title_id: PrimaryKey,
    pub review_id: PrimaryKey,
    pub author_id: PrimaryKey,
    pub text: String,
    /// Publication date, now if not given
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct UpdatedComment {
    pub id: PrimaryKey,
    pub text: Option<String>,
}
