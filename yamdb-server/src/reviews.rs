use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json,
};
use yamdb_collab::{ReviewInput, ReviewPatch};
use yamdb_core::{Method, Policy, PrimaryKey};

use crate::{
    auth::Actor,
    errors::{ErrorBody, ServerError, ServerResult},
    schemas::{
        CommentPatchSchema, CommentSchema, ReviewPatchSchema, ReviewSchema, ValidatedJson,
    },
    serialized::{Comment, Review, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews",
    tag = "reviews",
    responses(
        (status = 200, body = Vec<Review>),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn list_reviews(
    State(context): State<ServerContext>,
    Path(title_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Review>>> {
    let reviews = context.collab.reviews.list_reviews(title_id).await?;

    Ok(Json(reviews.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/titles/{title_id}/reviews",
    tag = "reviews",
    request_body = ReviewSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Review),
        (status = 400, body = ErrorBody, description = "Invalid, or the title was already reviewed by this user"),
        (status = 401, body = ErrorBody)
    )
)]
pub async fn create_review(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(title_id): Path<PrimaryKey>,
    body: Result<ValidatedJson<ReviewSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<Review>)> {
    actor.permit(Policy::AuthorOrModeratorOrAdmin, Method::Post)?;
    let ValidatedJson(body) = body?;

    let review = context
        .collab
        .reviews
        .create_review(
            actor.user(),
            title_id,
            ReviewInput {
                text: body.text,
                score: body.score,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(review.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    responses(
        (status = 200, body = Review),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn review(
    State(context): State<ServerContext>,
    Path((title_id, review_id)): Path<(PrimaryKey, PrimaryKey)>,
) -> ServerResult<Json<Review>> {
    let review = context.collab.reviews.review(title_id, review_id).await?;

    Ok(Json(review.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    request_body = ReviewPatchSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Review),
        (status = 403, body = ErrorBody, description = "Only the author, moderators and admins can edit"),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn update_review(
    actor: Actor,
    State(context): State<ServerContext>,
    Path((title_id, review_id)): Path<(PrimaryKey, PrimaryKey)>,
    body: Result<ValidatedJson<ReviewPatchSchema>, ServerError>,
) -> ServerResult<Json<Review>> {
    actor.permit(Policy::AuthorOrModeratorOrAdmin, Method::Patch)?;
    let ValidatedJson(body) = body?;

    let review = context
        .collab
        .reviews
        .update_review(
            actor.user(),
            title_id,
            review_id,
            ReviewPatch {
                text: body.text,
                score: body.score,
            },
        )
        .await?;

    Ok(Json(review.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The review was deleted along with its comments"),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_review(
    actor: Actor,
    State(context): State<ServerContext>,
    Path((title_id, review_id)): Path<(PrimaryKey, PrimaryKey)>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .reviews
        .delete_review(actor.user(), title_id, review_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments",
    tag = "reviews",
    responses(
        (status = 200, body = Vec<Comment>),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn list_comments(
    State(context): State<ServerContext>,
    Path((title_id, review_id)): Path<(PrimaryKey, PrimaryKey)>,
) -> ServerResult<Json<Vec<Comment>>> {
    let comments = context
        .collab
        .reviews
        .list_comments(title_id, review_id)
        .await?;

    Ok(Json(comments.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments",
    tag = "reviews",
    request_body = CommentSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Comment),
        (status = 400, body = ErrorBody),
        (status = 401, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn create_comment(
    actor: Actor,
    State(context): State<ServerContext>,
    Path((title_id, review_id)): Path<(PrimaryKey, PrimaryKey)>,
    body: Result<ValidatedJson<CommentSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<Comment>)> {
    actor.permit(Policy::AuthorOrModeratorOrAdmin, Method::Post)?;
    let ValidatedJson(body) = body?;

    let comment = context
        .collab
        .reviews
        .create_comment(actor.user(), title_id, review_id, body.text)
        .await?;

    Ok((StatusCode::CREATED, Json(comment.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "reviews",
    responses(
        (status = 200, body = Comment),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn comment(
    State(context): State<ServerContext>,
    Path((title_id, review_id, comment_id)): Path<(PrimaryKey, PrimaryKey, PrimaryKey)>,
) -> ServerResult<Json<Comment>> {
    let comment = context
        .collab
        .reviews
        .comment(title_id, review_id, comment_id)
        .await?;

    Ok(Json(comment.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "reviews",
    request_body = CommentPatchSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Comment),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn update_comment(
    actor: Actor,
    State(context): State<ServerContext>,
    Path((title_id, review_id, comment_id)): Path<(PrimaryKey, PrimaryKey, PrimaryKey)>,
    body: Result<ValidatedJson<CommentPatchSchema>, ServerError>,
) -> ServerResult<Json<Comment>> {
    actor.permit(Policy::AuthorOrModeratorOrAdmin, Method::Patch)?;
    let ValidatedJson(body) = body?;

    let comment = context
        .collab
        .reviews
        .update_comment(actor.user(), title_id, review_id, comment_id, body.text)
        .await?;

    Ok(Json(comment.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "reviews",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The comment was deleted"),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_comment(
    actor: Actor,
    State(context): State<ServerContext>,
    Path((title_id, review_id, comment_id)): Path<(PrimaryKey, PrimaryKey, PrimaryKey)>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .reviews
        .delete_comment(actor.user(), title_id, review_id, comment_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/titles/:title_id/reviews",
            get(list_reviews).post(create_review),
        )
        .route(
            "/titles/:title_id/reviews/:review_id",
            get(review).patch(update_review).delete(delete_review),
        )
        .route(
            "/titles/:title_id/reviews/:review_id/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/titles/:title_id/reviews/:review_id/comments/:comment_id",
            get(comment).patch(update_comment).delete(delete_comment),
        )
}
