use crate::api::api_error::APIError;
use crate::api::server::AppState;
use crate::error::Error;
use crate::zone::valid_username;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// The user authenticated by the reverse proxy in front of the API, taken from the
/// [`Config::remote_user_header`][crate::config::Config::remote_user_header] header.
pub(super) struct RemoteUser(pub String);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for RemoteUser {
    type Rejection = APIError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, APIError> {
        let username = parts
            .headers
            .get(state.config.remote_user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(Error::Unauthenticated)?;
        if !valid_username(username) {
            return Err(Error::InvalidUsername(username.to_string()).into());
        }
        Ok(RemoteUser(username.to_string()))
    }
}
