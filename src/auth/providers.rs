use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::OAuthClient;
use crate::error::AppError;

/// External identity source authenticating a user via redirect-based OAuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Line,
    Kakao,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Line => "line",
            Provider::Kakao => "kakao",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "google" => Some(Provider::Google),
            "line" => Some(Provider::Line),
            "kakao" => Some(Provider::Kakao),
            _ => None,
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::Line => "https://access.line.me/oauth2/v2.1/authorize",
            Provider::Kakao => "https://kauth.kakao.com/oauth/authorize",
        }
    }

    fn token_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::Line => "https://api.line.me/oauth2/v2.1/token",
            Provider::Kakao => "https://kauth.kakao.com/oauth/token",
        }
    }

    fn profile_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Provider::Line => "https://api.line.me/v2/profile",
            Provider::Kakao => "https://kapi.kakao.com/v2/user/me",
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            Provider::Google => "openid email profile",
            Provider::Line => "profile openid",
            Provider::Kakao => "profile_nickname profile_image account_email",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized subset of a third-party profile. One shape for every
/// provider; the field paths of the raw payloads stay in this module.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Builds the provider authorize URL for the popup redirect.
pub fn authorize_url(provider: Provider, oauth: &OAuthClient, state: &str) -> String {
    let params = [
        ("client_id", oauth.client_id.as_str()),
        ("redirect_uri", oauth.redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", provider.scope()),
        ("state", state),
    ];
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", provider.authorize_endpoint(), query)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineProfile {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "pictureUrl")]
    picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KakaoUser {
    id: Option<i64>,
    kakao_account: Option<KakaoAccount>,
}

#[derive(Debug, Deserialize)]
struct KakaoAccount {
    email: Option<String>,
    profile: Option<KakaoAccountProfile>,
}

#[derive(Debug, Deserialize)]
struct KakaoAccountProfile {
    nickname: Option<String>,
    profile_image_url: Option<String>,
}

impl From<GoogleUser> for SocialProfile {
    fn from(raw: GoogleUser) -> Self {
        Self {
            provider_user_id: raw.id,
            email: raw.email,
            display_name: raw.name,
            photo_url: raw.picture,
        }
    }
}

impl From<LineProfile> for SocialProfile {
    fn from(raw: LineProfile) -> Self {
        // The LINE profile API carries no email; the linker synthesizes one.
        Self {
            provider_user_id: raw.user_id,
            email: None,
            display_name: raw.display_name,
            photo_url: raw.picture_url,
        }
    }
}

impl From<KakaoUser> for SocialProfile {
    fn from(raw: KakaoUser) -> Self {
        let account = raw.kakao_account;
        let (email, profile) = match account {
            Some(a) => (a.email, a.profile),
            None => (None, None),
        };
        Self {
            provider_user_id: raw.id.map(|n| n.to_string()).unwrap_or_default(),
            email,
            display_name: profile.as_ref().and_then(|p| p.nickname.clone()),
            photo_url: profile.and_then(|p| p.profile_image_url),
        }
    }
}

fn upstream(provider: Provider, stage: &str, detail: impl fmt::Display) -> AppError {
    warn!(provider = %provider, stage, error = %detail, "provider exchange failed");
    AppError::UpstreamProvider(format!("{provider} {stage} failed"))
}

/// Two-step code -> access token -> profile exchange against the provider.
/// The shared reqwest client carries the request timeout, so a stalled
/// provider surfaces as an `UpstreamProvider` error instead of a hung
/// callback.
pub async fn fetch_profile(
    http: &reqwest::Client,
    provider: Provider,
    oauth: &OAuthClient,
    code: &str,
) -> Result<SocialProfile, AppError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", oauth.client_id.as_str()),
        ("client_secret", oauth.client_secret.as_str()),
        ("redirect_uri", oauth.redirect_uri.as_str()),
    ];
    let response = http
        .post(provider.token_endpoint())
        .form(&params)
        .send()
        .await
        .map_err(|e| upstream(provider, "token exchange", e))?;
    if !response.status().is_success() {
        return Err(upstream(provider, "token exchange", response.status()));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| upstream(provider, "token parse", e))?;

    let response = http
        .get(provider.profile_endpoint())
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(|e| upstream(provider, "profile fetch", e))?;
    if !response.status().is_success() {
        return Err(upstream(provider, "profile fetch", response.status()));
    }

    let profile = match provider {
        Provider::Google => response
            .json::<GoogleUser>()
            .await
            .map_err(|e| upstream(provider, "profile parse", e))?
            .into(),
        Provider::Line => response
            .json::<LineProfile>()
            .await
            .map_err(|e| upstream(provider, "profile parse", e))?
            .into(),
        Provider::Kakao => response
            .json::<KakaoUser>()
            .await
            .map_err(|e| upstream(provider, "profile parse", e))?
            .into(),
    };
    Ok(profile)
}
