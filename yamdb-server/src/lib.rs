mod auth;
mod catalog;
mod docs;
mod errors;
mod reviews;
mod schemas;
mod serialized;
mod users;

use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::{extract::Request, routing::get, ServiceExt};
use log::info;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::NormalizePath,
};
use yamdb_collab::Collab;

pub use docs::ApiDoc;
pub use errors::{ServerError, ServerResult};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

#[derive(Clone)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
}

/// Builds the full application.
/// Paths are matched with or without a trailing slash.
pub fn app(collab: Arc<Collab>) -> NormalizePath<axum::Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(catalog::router())
        .merge(reviews::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(ServerContext { collab });

    NormalizePath::trim_trailing_slash(root_router)
}

/// Starts the yamdb server
pub async fn run_server(collab: Arc<Collab>, port: u16) -> io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service(app(collab)),
    )
    .await
}
