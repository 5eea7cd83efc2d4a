use serde::Serialize;
use tailor_api::response::ErrorBody;
use tailor_api::status::StatusCode;
use tailor_api::USER_HEADER;

use crate::error::ServiceError;
use crate::proto::http_like::{Request, Response};

pub fn json_response(code: StatusCode, body: Vec<u8>) -> Response {
    Response {
        code,
        headers: vec![("content-type".into(), "application/json".into())],
        body,
    }
}

/// Serialize `value` as a 200 body. Serialization failure is a 500.
pub fn ok_json<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => json_response(StatusCode::Ok, body),
        Err(_) => Response::empty(StatusCode::InternalServerError),
    }
}

pub fn error_json(code: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::to_vec(&ErrorBody {
        error: message.into(),
    })
    .unwrap_or_else(|_| b"{}".to_vec());
    json_response(code, body)
}

pub fn service_error(err: &ServiceError) -> Response {
    error_json(err.status(), err.public_message())
}

/// Handle supplied by the authentication layer, if any.
pub fn user_handle(req: &Request) -> Option<&str> {
    req.header(USER_HEADER)
}
