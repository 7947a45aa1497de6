use serde::Deserialize;

/// Admin-created local account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Partial profile update; a present `password` is re-hashed before the
/// store ever sees it.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: Option<bool>,
    pub password: Option<String>,
}
