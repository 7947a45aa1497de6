use axum::{
    extract::{FromRef, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, StatusResponse, StatusUser},
    extract::MaybeUser,
    linker, password,
    providers::{self, Provider},
    tokens::{self, JwtKeys, TokenPair},
};
use crate::{
    error::AppError,
    state::AppState,
    store::UserStore,
    users::model::{PublicUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/status", get(status))
        .route("/auth/logout", post(logout))
        .route("/auth/:provider", get(oauth_start))
        .route("/auth/:provider/callback", get(oauth_callback))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if email.is_empty() {
        return Err(AppError::Validation("email is required".into()));
    }
    let plain = payload.password.unwrap_or_default();
    if plain.is_empty() {
        return Err(AppError::Validation("password is required".into()));
    }

    let user = match state.users.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    let ok = password::verify_password(&plain, &user.password_hash).map_err(AppError::Internal)?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let user = state.users.touch_last_login(user.id).await?;
    let keys = JwtKeys::from_ref(&state);
    let pair = keys.issue_pair(&user).map_err(AppError::Internal)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("refreshToken is required".into()))?;
    let keys = JwtKeys::from_ref(&state);
    let access = tokens::refresh_access(&keys, state.users.as_ref(), &token).await?;
    Ok(Json(RefreshResponse {
        access_token: access,
    }))
}

/// Never errors merely for being unauthenticated; an expired token still
/// surfaces TOKEN_EXPIRED through the extractor.
pub async fn status(MaybeUser(identity): MaybeUser) -> Json<StatusResponse> {
    Json(StatusResponse {
        authenticated: identity.is_some(),
        user: identity.map(StatusUser::from),
    })
}

/// In bearer mode the server holds no session; the client discards its
/// tokens. The endpoint exists for client symmetry.
pub async fn logout() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

#[instrument(skip(state))]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    let provider =
        Provider::parse(&provider).ok_or_else(|| AppError::NotFound("unknown provider".into()))?;
    let oauth = state
        .config
        .oauth(provider)
        .ok_or_else(|| AppError::NotFound(format!("{provider} login is not configured")))?;
    let csrf: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    Ok(Redirect::temporary(&providers::authorize_url(
        provider, oauth, &csrf,
    )))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    #[allow(dead_code)]
    pub state: Option<String>,
    pub error: Option<String>,
}

#[instrument(skip(state, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(provider) = Provider::parse(&provider) else {
        return AppError::NotFound("unknown provider".into()).into_response();
    };
    match run_callback(&state, provider, &query).await {
        Ok((pair, user)) => {
            popup_success(&state.config.client_url, provider, &pair, user).into_response()
        }
        Err(e) => {
            warn!(provider = %provider, code = e.code(), error = %e, "oauth callback failed");
            // The popup must always land somewhere the frontend controls;
            // a raw error page would leave it stuck.
            let target = format!(
                "{}/login?error={}",
                state.config.client_url,
                urlencoding::encode(e.code())
            );
            Redirect::temporary(&target).into_response()
        }
    }
}

async fn run_callback(
    state: &AppState,
    provider: Provider,
    query: &CallbackQuery,
) -> Result<(TokenPair, User), AppError> {
    if let Some(err) = &query.error {
        return Err(AppError::UpstreamProvider(format!(
            "{provider} authorization denied: {err}"
        )));
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("missing authorization code".into()))?;
    let oauth = state
        .config
        .oauth(provider)
        .ok_or_else(|| AppError::NotFound(format!("{provider} login is not configured")))?;

    let profile = providers::fetch_profile(&state.http, provider, oauth, code).await?;
    let user = linker::link_or_create(state.users.as_ref(), provider, &profile).await?;
    let user = state.users.touch_last_login(user.id).await?;

    let keys = JwtKeys::from_ref(state);
    let pair = keys.issue_pair(&user).map_err(AppError::Internal)?;
    info!(user_id = %user.id, provider = %provider, "social login");
    Ok((pair, user))
}

/// Small page handed to the OAuth popup: posts the token payload to the
/// opener at the configured client origin (never `*`), then closes itself.
fn popup_success(client_url: &str, provider: Provider, pair: &TokenPair, user: User) -> Html<String> {
    let payload = serde_json::json!({
        "type": "login_success",
        "provider": provider,
        "token": pair.access,
        "refreshToken": pair.refresh,
        "user": PublicUser::from(user),
    });
    // `<` is escaped so user-controlled strings cannot terminate the
    // script element.
    let payload = serde_json::to_string(&payload)
        .unwrap_or_else(|_| "null".into())
        .replace('<', "\\u003c");
    let origin = serde_json::to_string(client_url).unwrap_or_else(|_| String::from("\"\""));
    Html(format!(
        "<!doctype html>\n<html>\n<body>\n<script>\n\
         var payload = {payload};\n\
         if (window.opener) {{ window.opener.postMessage(payload, {origin}); }}\n\
         window.close();\n\
         </script>\n</body>\n</html>"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Identity;
    use crate::store::NewUser;
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn seed_user(state: &AppState, email: &str, plain: &str) -> User {
        state
            .users
            .insert(NewUser {
                display_name: "Ann".into(),
                email: email.into(),
                password_hash: password::hash_password(plain).unwrap(),
                photo_url: None,
                is_admin: false,
                provider_link: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_returns_tokens_and_a_password_free_user() {
        let state = AppState::fake();
        seed_user(&state, "ann@x.com", "secret123").await;

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: Some("ann@x.com".into()),
                password: Some("secret123".into()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.user.email, "ann@x.com");
        assert!(!response.user.is_admin);
        assert!(response.user.last_login.is_some());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("accessToken"));
        assert!(json.contains("refreshToken"));
        assert!(!json.to_lowercase().contains("password"));
    }

    #[tokio::test]
    async fn login_failure_is_generic_for_bad_password_and_unknown_email() {
        let state = AppState::fake();
        seed_user(&state, "ann@x.com", "secret123").await;

        let wrong_password = login(
            State(state.clone()),
            Json(LoginRequest {
                email: Some("ann@x.com".into()),
                password: Some("wrong".into()),
            }),
        )
        .await
        .unwrap_err();
        let unknown_email = login(
            State(state.clone()),
            Json(LoginRequest {
                email: Some("ghost@x.com".into()),
                password: Some("secret123".into()),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let state = AppState::fake();
        let missing_password = login(
            State(state.clone()),
            Json(LoginRequest {
                email: Some("ann@x.com".into()),
                password: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(missing_password, AppError::Validation(_)));

        let missing_email = login(
            State(state),
            Json(LoginRequest {
                email: None,
                password: Some("secret123".into()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(missing_email, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn login_email_is_case_insensitive() {
        let state = AppState::fake();
        seed_user(&state, "ann@x.com", "secret123").await;
        let result = login(
            State(state),
            Json(LoginRequest {
                email: Some("  Ann@X.com ".into()),
                password: Some("secret123".into()),
            }),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn refresh_requires_a_token() {
        let state = AppState::fake();
        let err = refresh_token(
            State(state),
            Json(RefreshRequest {
                refresh_token: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn refresh_mints_a_new_access_token() {
        let state = AppState::fake();
        let user = seed_user(&state, "ann@x.com", "secret123").await;
        let keys = JwtKeys::from_ref(&state);
        let pair = keys.issue_pair(&user).unwrap();

        let Json(response) = refresh_token(
            State(state),
            Json(RefreshRequest {
                refresh_token: Some(pair.refresh),
            }),
        )
        .await
        .unwrap();
        let claims = keys.verify_access(&response.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn status_reports_identity_or_anonymous() {
        let Json(anonymous) = status(MaybeUser(None)).await;
        assert!(!anonymous.authenticated);
        assert!(anonymous.user.is_none());

        let Json(known) = status(MaybeUser(Some(Identity {
            user_id: Uuid::new_v4(),
            email: "ann@x.com".into(),
            display_name: "Ann".into(),
            is_admin: true,
        })))
        .await;
        assert!(known.authenticated);
        assert!(known.user.unwrap().is_admin);
    }

    #[test]
    fn popup_posts_to_the_exact_client_origin() {
        let user = User {
            id: Uuid::new_v4(),
            display_name: "Ann".into(),
            email: "ann@x.com".into(),
            password_hash: "hash".into(),
            photo_url: None,
            is_admin: false,
            google_id: Some("g-1".into()),
            line_id: None,
            kakao_id: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        let pair = TokenPair {
            access: "acc".into(),
            refresh: "ref".into(),
        };
        let Html(page) = popup_success("http://localhost:3000", Provider::Google, &pair, user);
        assert!(page.contains(r#"postMessage(payload, "http://localhost:3000")"#));
        assert!(!page.contains(r#"postMessage(payload, "*")"#));
        assert!(page.contains(r#""type":"login_success""#));
        assert!(page.contains(r#""provider":"google""#));
        assert!(page.contains(r#""refreshToken":"ref""#));
        assert!(!page.to_lowercase().contains("password"));
    }

    #[test]
    fn popup_escapes_script_breaking_names() {
        let user = User {
            id: Uuid::new_v4(),
            display_name: "</script><script>alert(1)".into(),
            email: "ann@x.com".into(),
            password_hash: "hash".into(),
            photo_url: None,
            is_admin: false,
            google_id: None,
            line_id: None,
            kakao_id: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        let pair = TokenPair {
            access: "acc".into(),
            refresh: "ref".into(),
        };
        let Html(page) = popup_success("http://localhost:3000", Provider::Google, &pair, user);
        assert!(!page.contains("</script><script>alert"));
    }

    #[tokio::test]
    async fn callback_with_provider_error_redirects_to_client_login() {
        let state = AppState::fake();
        let err = run_callback(
            &state,
            Provider::Google,
            &CallbackQuery {
                code: None,
                state: None,
                error: Some("access_denied".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UpstreamProvider(_)));
    }

    #[tokio::test]
    async fn callback_without_code_is_a_validation_error() {
        let state = AppState::fake();
        let err = run_callback(
            &state,
            Provider::Google,
            &CallbackQuery {
                code: None,
                state: None,
                error: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
