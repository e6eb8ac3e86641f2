use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub(crate) struct APIError(anyhow::Error);

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        let status = match any_err.downcast_ref::<Error>() {
            Some(
                Error::BadZoneFile(_)
                | Error::InvalidUsername(_)
                | Error::NotIPv4(_)
                | Error::QueryExtractorRejection(_),
            ) => StatusCode::BAD_REQUEST,
            Some(Error::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Some(Error::UnknownToken) => StatusCode::FORBIDDEN,
            Some(Error::RecordUpdate(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(Error::ZoneCreation(reason)) if reason.contains("public IP") => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {any_err:#}");
        }
        let body = Json(json!({
            "error": format!("{any_err}"),
        }));
        (status, body).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        APIError::from(self).into_response()
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: Error) -> StatusCode {
        APIError::from(err).into_response().status()
    }

    #[test]
    fn statuses() {
        assert_eq!(
            status(Error::BadZoneFile("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Error::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(Error::UnknownToken), StatusCode::FORBIDDEN);
        assert_eq!(
            status(Error::RecordUpdate("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(Error::ZoneCreation("no public IP".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(Error::ZoneFileCheck("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(Error::FatalInconsistency("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
