use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json,
};
use yamdb_collab::{NewUser, UserPatch};
use yamdb_core::{Method, Policy, Role};

use crate::{
    auth::Actor,
    errors::{ErrorBody, ServerError, ServerResult},
    schemas::{NewUserSchema, SearchQuery, UserPatchSchema, ValidatedJson},
    serialized::{ToSerialized, User},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    params(SearchQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<User>),
        (status = 401, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn list_users(
    actor: Actor,
    State(context): State<ServerContext>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<User>>> {
    let users = context
        .collab
        .users
        .list(actor.user(), query.search.as_deref())
        .await?;

    Ok(Json(users.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "users",
    request_body = NewUserSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = User),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn create_user(
    actor: Actor,
    State(context): State<ServerContext>,
    body: Result<ValidatedJson<NewUserSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<User>)> {
    actor.permit(Policy::AdminOnly, Method::Post)?;
    let ValidatedJson(body) = body?;

    let role = parse_role(body.role.as_deref())?.unwrap_or_default();

    let user = context
        .collab
        .users
        .create(
            actor.user(),
            NewUser {
                username: body.username,
                email: body.email,
                role,
                first_name: body.first_name,
                last_name: body.last_name,
                bio: body.bio,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/users/{username}",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn user(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .users
        .by_username(actor.user(), &username)
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/users/{username}",
    tag = "users",
    request_body = UserPatchSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn update_user(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
    body: Result<ValidatedJson<UserPatchSchema>, ServerError>,
) -> ServerResult<Json<User>> {
    actor.permit(Policy::AdminOnly, Method::Patch)?;
    let ValidatedJson(body) = body?;

    let role = parse_role(body.role.as_deref())?;

    let user = context
        .collab
        .users
        .update(actor.user(), &username, to_patch(body), role)
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/users/{username}",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The user was deleted"),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_user(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .users
        .delete(actor.user(), &username)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, body = ErrorBody)
    )
)]
pub async fn me(actor: Actor, State(context): State<ServerContext>) -> ServerResult<Json<User>> {
    let user = context.collab.users.me(actor.user()).await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/users/me",
    tag = "users",
    request_body = UserPatchSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User, description = "The profile was updated, the role is left as is"),
        (status = 401, body = ErrorBody)
    )
)]
pub async fn update_me(
    actor: Actor,
    State(context): State<ServerContext>,
    body: Result<ValidatedJson<UserPatchSchema>, ServerError>,
) -> ServerResult<Json<User>> {
    actor.user().ok_or(ServerError::AuthenticationRequired)?;
    let ValidatedJson(body) = body?;

    let user = context
        .collab
        .users
        .update_me(actor.user(), to_patch(body))
        .await?;

    Ok(Json(user.to_serialized()))
}

fn parse_role(role: Option<&str>) -> ServerResult<Option<Role>> {
    role.map(str::parse::<Role>)
        .transpose()
        .map_err(|e| ServerError::validation("role", e.to_string()))
}

fn to_patch(body: UserPatchSchema) -> UserPatch {
    UserPatch {
        username: body.username,
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        bio: body.bio,
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(me).patch(update_me))
        .route(
            "/users/:username",
            get(user).patch(update_user).delete(delete_user),
        )
}
