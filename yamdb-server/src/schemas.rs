//! Request bodies and query parameters accepted by the endpoints

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationErrors};

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 16))]
    pub code: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewUserSchema {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email, length(max = 254))]
    pub email: String,
    /// One of `user`, `moderator`, `admin`. Defaults to `user`.
    pub role: Option<String>,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub bio: String,
}

/// Changes to a user. `role` is ignored when users edit their own profile.
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatchSchema {
    #[validate(length(min = 1, max = 150))]
    pub username: Option<String>,
    #[validate(email, length(max = 254))]
    pub email: Option<String>,
    pub role: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(length(max = 200))]
    pub bio: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierSchema {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub slug: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTitleSchema {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    /// Slug of the category
    pub category: Option<String>,
    /// Slugs of the genres
    #[serde(default)]
    pub genre: Vec<String>,
}

/// Changes to a title. Setting `description` or `category` to null clears it.
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TitlePatchSchema {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
    pub genre: Option<Vec<String>>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewSchema {
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(range(min = 1, max = 10))]
    pub score: i32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewPatchSchema {
    #[validate(length(min = 1))]
    pub text: Option<String>,
    #[validate(range(min = 1, max = 10))]
    pub score: Option<i32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentSchema {
    #[validate(length(min = 1))]
    pub text: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentPatchSchema {
    #[validate(length(min = 1))]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Only return entries whose name contains this
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TitleQuery {
    /// Genre slug
    pub genre: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Part of the name
    pub name: Option<String>,
    pub year: Option<i32>,
}

/// Tells an absent field (`None`) apart from an explicit null (`Some(None)`)
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> =
            Json::from_request(req, state)
                .await
                .map_err(|e: JsonRejection| ServerError::Validation {
                    field: None,
                    message: e.body_text(),
                })?;

        extracted_json.0.validate().map_err(first_invalid_field)?;

        Ok(Self(extracted_json.0))
    }
}

/// Reports the first invalid field, in alphabetical order
fn first_invalid_field(errors: ValidationErrors) -> ServerError {
    let mut fields: Vec<_> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| (field.to_string(), errors.first().cloned()))
        .collect();

    fields.sort_by(|a, b| a.0.cmp(&b.0));

    match fields.into_iter().next() {
        Some((field, Some(error))) => {
            let message = error
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value ({})", error.code));

            ServerError::validation(field, message)
        }
        Some((field, None)) => ServerError::validation(field, "Invalid value"),
        None => ServerError::Validation {
            field: None,
            message: "Request body is invalid".to_string(),
        },
    }
}
