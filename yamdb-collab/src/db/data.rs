use chrono::{DateTime, Utc};
use yamdb_core::{Authored, PrimaryKey, Rating, User};

/// A one-time code challenge for passwordless login
#[derive(Debug, Clone)]
pub struct ChallengeData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    /// Argon2 hash of the code, the code itself is never stored
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Set once the challenge has been exchanged for a session
    pub consumed_at: Option<DateTime<Utc>>,
    /// Wrong codes given so far
    pub failed_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl ChallengeData {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in, as it is stored right now
    pub user: User,
}

/// The kinds of classifiers a title can have.
/// Both are stored the same way, but in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classifier {
    Category,
    Genre,
}

impl Classifier {
    pub fn resource(&self) -> &'static str {
        match self {
            Classifier::Category => "category",
            Classifier::Genre => "genre",
        }
    }
}

/// A category or a genre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierData {
    pub id: PrimaryKey,
    pub name: String,
    /// Unique within its kind
    pub slug: String,
}

/// A reviewable creative work
#[derive(Debug, Clone)]
pub struct TitleData {
    pub id: PrimaryKey,
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category: Option<ClassifierData>,
    pub genres: Vec<ClassifierData>,
    /// Computed on every read from the reviews of the title
    pub rating: Rating,
}

#[derive(Debug, Clone)]
pub struct ReviewData {
    pub id: PrimaryKey,
    pub title_id: PrimaryKey,
    pub author_id: PrimaryKey,
    /// Username of the author
    pub author: String,
    pub text: String,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommentData {
    pub id: PrimaryKey,
    pub title_id: PrimaryKey,
    pub review_id: PrimaryKey,
    pub author_id: PrimaryKey,
    /// Username of the author
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Authored for ReviewData {
    fn author_id(&self) -> PrimaryKey {
        self.author_id
    }
}

impl Authored for CommentData {
    fn author_id(&self) -> PrimaryKey {
        self.author_id
    }
}
