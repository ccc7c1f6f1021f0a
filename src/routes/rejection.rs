use std::convert::Infallible;

use serde_json::json;
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, Rejection, UnsupportedMediaType},
    reply::{Reply, Response},
};

use crate::error::{ApiError, ValidationError};

fn detail(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&json!({ "detail": message })), status).into_response()
}

fn api_error(error: &ApiError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match error {
        ApiError::Validation(fields) => warp::reply::with_status(warp::reply::json(fields), status).into_response(),
        ApiError::NotFound => detail(status, "Not found."),
        ApiError::Unauthorized(message) => detail(status, message),
        ApiError::Store(e) => {
            log::error!("Request failed: {e}");
            detail(status, "A server error occurred.")
        }
    }
}

/// Turns every rejection into a JSON body with a matching status code.
pub async fn recover(err: Rejection) -> Result<Response, Infallible> {
    if let Some(e) = err.find::<ApiError>() {
        return Ok(api_error(e));
    }

    let response = if err.is_not_found() {
        detail(StatusCode::NOT_FOUND, "Not found.")
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        let error = ValidationError::non_field(&format!("JSON parse error - {e}"));
        warp::reply::with_status(warp::reply::json(&error), StatusCode::BAD_REQUEST).into_response()
    } else if err.find::<PayloadTooLarge>().is_some() {
        detail(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.")
    } else if err.find::<LengthRequired>().is_some() {
        detail(StatusCode::LENGTH_REQUIRED, "Content-Length header is required.")
    } else if err.find::<UnsupportedMediaType>().is_some() {
        detail(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type in request.")
    } else if err.find::<MethodNotAllowed>().is_some() {
        detail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        detail(StatusCode::BAD_REQUEST, "Invalid query string.")
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        detail(StatusCode::BAD_REQUEST, "Missing request header.")
    } else {
        log::error!("Unhandled rejection: {err:?}");
        detail(StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.")
    };

    Ok(response)
}
