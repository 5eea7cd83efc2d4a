use tailor_api::request::ParamError;
use tailor_api::status::StatusCode;

use crate::storage::StoreError;

pub const UPSTREAM_UNAVAILABLE: &str = "upstream unavailable";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Rejected before any store or index call.
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    NotFound(String),
    /// Transient; the detail is for logs only.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BadRequest,
            ServiceError::Unauthenticated => StatusCode::Unauthorized,
            ServiceError::NotFound(_) => StatusCode::NotFound,
            ServiceError::Unavailable(_) => StatusCode::ServiceUnavailable,
        }
    }

    /// Text safe to show a caller.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Unavailable(_) => UPSTREAM_UNAVAILABLE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

impl From<ParamError> for ServiceError {
    fn from(e: ParamError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownUser(id) => ServiceError::NotFound(format!("user {id} not found")),
            StoreError::DuplicateHandle(h) => {
                ServiceError::Validation(format!("handle {h:?} is already taken"))
            }
            other => ServiceError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ServiceError::Validation("x".into()).status().as_u16(), 400);
        assert_eq!(ServiceError::Unauthenticated.status().as_u16(), 401);
        assert_eq!(ServiceError::NotFound("x".into()).status().as_u16(), 404);
        assert_eq!(ServiceError::Unavailable("x".into()).status().as_u16(), 503);
    }

    #[test]
    fn upstream_detail_is_not_public() {
        let e = ServiceError::from(StoreError::Unavailable("pool timed out on 10.0.0.7".into()));
        assert!(e.is_transient());
        assert_eq!(e.public_message(), UPSTREAM_UNAVAILABLE);
        assert!(e.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn param_errors_are_validation() {
        let e = ServiceError::from(ParamError::MissingQuery);
        assert!(matches!(e, ServiceError::Validation(_)));
        assert_eq!(e.public_message(), "missing query parameter 'q'");
    }
}
