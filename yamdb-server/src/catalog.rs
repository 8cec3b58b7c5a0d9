use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json,
};
use yamdb_collab::{Classifier as Kind, NewClassifier, TitleFilter, TitleInput, TitlePatch};
use yamdb_core::{Method, Policy, PrimaryKey, User};

use crate::{
    auth::Actor,
    errors::{ErrorBody, ServerError, ServerResult},
    schemas::{
        ClassifierSchema, NewTitleSchema, SearchQuery, TitlePatchSchema, TitleQuery,
        ValidatedJson,
    },
    serialized::{Classifier, Title, ToSerialized},
    Router, ServerContext,
};

async fn list_classifiers(
    context: &ServerContext,
    kind: Kind,
    query: SearchQuery,
) -> ServerResult<Json<Vec<Classifier>>> {
    let classifiers = context
        .collab
        .catalog
        .list_classifiers(kind, query.search.as_deref())
        .await?;

    Ok(Json(classifiers.to_serialized()))
}

async fn create_classifier(
    context: &ServerContext,
    actor: Option<&User>,
    kind: Kind,
    body: ClassifierSchema,
) -> ServerResult<(StatusCode, Json<Classifier>)> {
    let classifier = context
        .collab
        .catalog
        .create_classifier(
            actor,
            kind,
            NewClassifier {
                name: body.name,
                slug: body.slug,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(classifier.to_serialized())))
}

async fn delete_classifier(
    context: &ServerContext,
    actor: Option<&User>,
    kind: Kind,
    slug: &str,
) -> ServerResult<StatusCode> {
    context
        .collab
        .catalog
        .delete_classifier(actor, kind, slug)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/categories",
    tag = "catalog",
    params(SearchQuery),
    responses(
        (status = 200, body = Vec<Classifier>)
    )
)]
pub async fn list_categories(
    State(context): State<ServerContext>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<Classifier>>> {
    list_classifiers(&context, Kind::Category, query).await
}

#[utoipa::path(
    post,
    path = "/v1/categories",
    tag = "catalog",
    request_body = ClassifierSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Classifier),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn create_category(
    actor: Actor,
    State(context): State<ServerContext>,
    body: Result<ValidatedJson<ClassifierSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<Classifier>)> {
    actor.permit(Policy::AdminOrReadOnly, Method::Post)?;
    let ValidatedJson(body) = body?;

    create_classifier(&context, actor.user(), Kind::Category, body).await
}

#[utoipa::path(
    delete,
    path = "/v1/categories/{slug}",
    tag = "catalog",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The category was deleted, its titles are left without one"),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_category(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(slug): Path<String>,
) -> ServerResult<StatusCode> {
    delete_classifier(&context, actor.user(), Kind::Category, &slug).await
}

#[utoipa::path(
    get,
    path = "/v1/genres",
    tag = "catalog",
    params(SearchQuery),
    responses(
        (status = 200, body = Vec<Classifier>)
    )
)]
pub async fn list_genres(
    State(context): State<ServerContext>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<Classifier>>> {
    list_classifiers(&context, Kind::Genre, query).await
}

#[utoipa::path(
    post,
    path = "/v1/genres",
    tag = "catalog",
    request_body = ClassifierSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Classifier),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn create_genre(
    actor: Actor,
    State(context): State<ServerContext>,
    body: Result<ValidatedJson<ClassifierSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<Classifier>)> {
    actor.permit(Policy::AdminOrReadOnly, Method::Post)?;
    let ValidatedJson(body) = body?;

    create_classifier(&context, actor.user(), Kind::Genre, body).await
}

#[utoipa::path(
    delete,
    path = "/v1/genres/{slug}",
    tag = "catalog",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The genre was deleted"),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_genre(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(slug): Path<String>,
) -> ServerResult<StatusCode> {
    delete_classifier(&context, actor.user(), Kind::Genre, &slug).await
}

#[utoipa::path(
    get,
    path = "/v1/titles",
    tag = "catalog",
    params(TitleQuery),
    responses(
        (status = 200, body = Vec<Title>)
    )
)]
pub async fn list_titles(
    State(context): State<ServerContext>,
    Query(query): Query<TitleQuery>,
) -> ServerResult<Json<Vec<Title>>> {
    let titles = context
        .collab
        .catalog
        .list_titles(TitleFilter {
            genre: query.genre,
            category: query.category,
            name: query.name,
            year: query.year,
        })
        .await?;

    Ok(Json(titles.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/titles",
    tag = "catalog",
    request_body = NewTitleSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Title),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn create_title(
    actor: Actor,
    State(context): State<ServerContext>,
    body: Result<ValidatedJson<NewTitleSchema>, ServerError>,
) -> ServerResult<(StatusCode, Json<Title>)> {
    actor.permit(Policy::AdminOrReadOnly, Method::Post)?;
    let ValidatedJson(body) = body?;

    let title = context
        .collab
        .catalog
        .create_title(
            actor.user(),
            TitleInput {
                name: body.name,
                year: body.year,
                description: body.description,
                category: body.category,
                genres: body.genre,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(title.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}",
    tag = "catalog",
    responses(
        (status = 200, body = Title),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn title(
    State(context): State<ServerContext>,
    Path(title_id): Path<PrimaryKey>,
) -> ServerResult<Json<Title>> {
    let title = context.collab.catalog.title(title_id).await?;

    Ok(Json(title.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}",
    tag = "catalog",
    request_body = TitlePatchSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Title),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn update_title(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(title_id): Path<PrimaryKey>,
    body: Result<ValidatedJson<TitlePatchSchema>, ServerError>,
) -> ServerResult<Json<Title>> {
    actor.permit(Policy::AdminOrReadOnly, Method::Patch)?;
    let ValidatedJson(body) = body?;

    let title = context
        .collab
        .catalog
        .update_title(
            actor.user(),
            title_id,
            TitlePatch {
                name: body.name,
                year: body.year,
                description: body.description,
                category: body.category,
                genres: body.genre,
            },
        )
        .await?;

    Ok(Json(title.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}",
    tag = "catalog",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The title was deleted along with its reviews"),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn delete_title(
    actor: Actor,
    State(context): State<ServerContext>,
    Path(title_id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .catalog
        .delete_title(actor.user(), title_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:slug", delete(delete_category))
        .route("/genres", get(list_genres).post(create_genre))
        .route("/genres/:slug", delete(delete_genre))
        .route("/titles", get(list_titles).post(create_title))
        .route(
            "/titles/:title_id",
            get(title).patch(update_title).delete(delete_title),
        )
}
