use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    routing::post,
    Json,
};
use yamdb_core::{Method, Policy, User};

use crate::{
    errors::{ErrorBody, ServerError, ServerResult},
    schemas::{EmailSchema, TokenSchema, ValidatedJson},
    serialized::{CodeSent, ToSerialized, Token},
    Router, ServerContext,
};

/// The user making the request, if any.
///
/// A request without an Authorization header is anonymous. A malformed header,
/// or a token without a live session, is rejected.
pub struct Actor(pub Option<User>);

impl Actor {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }

    /// Runs the collection-level check of a policy.
    ///
    /// Write handlers call this before looking at the request body, so callers
    /// without access never learn whether their body was valid.
    pub fn permit(&self, policy: Policy, method: Method) -> ServerResult<()> {
        Ok(policy.check(self.user(), method)?)
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for Actor {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Self(None));
        };

        let value = value
            .to_str()
            .map_err(|_| ServerError::AuthenticationRequired)?;

        let words: Vec<_> = value.split_ascii_whitespace().collect();

        let token = match words.as_slice() {
            ["Bearer", token] => *token,
            _ => return Err(ServerError::AuthenticationRequired),
        };

        let session = state.collab.auth.session(token).await?;

        Ok(Self(Some(session.user)))
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/email",
    tag = "auth",
    request_body = EmailSchema,
    responses(
        (status = 200, body = CodeSent, description = "A confirmation code was sent to the email"),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody, description = "The code could not be delivered")
    )
)]
pub async fn request_code(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<EmailSchema>,
) -> ServerResult<Json<CodeSent>> {
    context.collab.auth.issue_challenge(&body.email).await?;

    Ok(Json(CodeSent { email: body.email }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/token",
    tag = "auth",
    request_body = TokenSchema,
    responses(
        (status = 200, body = Token),
        (status = 400, body = ErrorBody, description = "The code is invalid or the email is unknown")
    )
)]
pub async fn issue_token(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<TokenSchema>,
) -> ServerResult<Json<Token>> {
    let session = context
        .collab
        .auth
        .redeem_challenge(&body.email, &body.code)
        .await?;

    Ok(Json(session.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/auth/email", post(request_code))
        .route("/auth/token", post(issue_token))
}
