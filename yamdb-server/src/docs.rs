use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, catalog, errors, reviews, schemas, serialized, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::request_code,
        auth::issue_token,
        users::list_users,
        users::create_user,
        users::user,
        users::update_user,
        users::delete_user,
        users::me,
        users::update_me,
        catalog::list_categories,
        catalog::create_category,
        catalog::delete_category,
        catalog::list_genres,
        catalog::create_genre,
        catalog::delete_genre,
        catalog::list_titles,
        catalog::create_title,
        catalog::title,
        catalog::update_title,
        catalog::delete_title,
        reviews::list_reviews,
        reviews::create_review,
        reviews::review,
        reviews::update_review,
        reviews::delete_review,
        reviews::list_comments,
        reviews::create_comment,
        reviews::comment,
        reviews::update_comment,
        reviews::delete_comment,
    ),
    components(schemas(
        errors::ErrorBody,
        schemas::EmailSchema,
        schemas::TokenSchema,
        schemas::NewUserSchema,
        schemas::UserPatchSchema,
        schemas::ClassifierSchema,
        schemas::NewTitleSchema,
        schemas::TitlePatchSchema,
        schemas::ReviewSchema,
        schemas::ReviewPatchSchema,
        schemas::CommentSchema,
        schemas::CommentPatchSchema,
        serialized::User,
        serialized::CodeSent,
        serialized::Token,
        serialized::Classifier,
        serialized::Title,
        serialized::Review,
        serialized::Comment,
    )),
    modifiers(&Security),
    info(
        description = "yamdb-server exposes endpoints to review titles and read their ratings"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
