//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use yamdb_collab::{ClassifierData, CommentData, ReviewData, SessionData, TitleData};
use yamdb_core::{PrimaryKey, User as CoreUser};

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    bio: String,
    /// One of `user`, `moderator`, `admin`
    role: String,
}

/// Returned when a confirmation code was sent
#[derive(Debug, Serialize, ToSchema)]
pub struct CodeSent {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Token {
    token: String,
}

/// A category or a genre
#[derive(Debug, Serialize, ToSchema)]
pub struct Classifier {
    name: String,
    slug: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Title {
    id: PrimaryKey,
    name: String,
    year: i32,
    /// Mean score of all reviews, null if there are none
    rating: Option<f64>,
    description: Option<String>,
    genre: Vec<Classifier>,
    category: Option<Classifier>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Review {
    id: PrimaryKey,
    text: String,
    /// Username of the author
    author: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Comment {
    id: PrimaryKey,
    text: String,
    /// Username of the author
    author: String,
    pub_date: DateTime<Utc>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for CoreUser {
    fn to_serialized(&self) -> User {
        User {
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            bio: self.bio.clone(),
            role: self.role.to_string(),
        }
    }
}

impl ToSerialized<Token> for SessionData {
    fn to_serialized(&self) -> Token {
        Token {
            token: self.token.clone(),
        }
    }
}

impl ToSerialized<Classifier> for ClassifierData {
    fn to_serialized(&self) -> Classifier {
        Classifier {
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl ToSerialized<Title> for TitleData {
    fn to_serialized(&self) -> Title {
        Title {
            id: self.id,
            name: self.name.clone(),
            year: self.year,
            rating: self.rating,
            description: self.description.clone(),
            genre: self.genres.to_serialized(),
            category: self.category.as_ref().map(|c| c.to_serialized()),
        }
    }
}

impl ToSerialized<Review> for ReviewData {
    fn to_serialized(&self) -> Review {
        Review {
            id: self.id,
            text: self.text.clone(),
            author: self.author.clone(),
            score: self.score,
            pub_date: self.created_at,
        }
    }
}

impl ToSerialized<Comment> for CommentData {
    fn to_serialized(&self) -> Comment {
        Comment {
            id: self.id,
            text: self.text.clone(),
            author: self.author.clone(),
            pub_date: self.created_at,
        }
    }
}
