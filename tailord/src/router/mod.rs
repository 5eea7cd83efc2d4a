use tailor_api::status::StatusCode;
use tracing::debug;

use crate::proto::http_like::{Request, Response};
use crate::services::Services;

mod api;
mod util;

pub use util::{error_json, json_response};

const ROUTES: &[(&str, &str)] = &[
    ("GET", "/health/ready"),
    ("GET", "/api/search"),
    ("POST", "/api/clicks"),
    ("GET", "/api/clicks"),
    ("GET", "/api/history"),
    ("DELETE", "/api/history"),
    ("GET", "/api/recommendations"),
];

pub async fn handle(req: Request, svc: &Services) -> Response {
    let resp = match (req.method.as_str(), req.route()) {
        ("GET", "/health/ready") => api::handle_ready(svc).await,
        ("GET", "/api/search") => api::handle_search(&req, svc).await,
        ("POST", "/api/clicks") => api::handle_click(&req, svc).await,
        ("GET", "/api/clicks") => api::handle_click_history(&req, svc).await,
        ("GET", "/api/history") => api::handle_history(&req, svc).await,
        ("DELETE", "/api/history") => api::handle_clear_history(&req, svc).await,
        ("GET", "/api/recommendations") => api::handle_recommendations(&req, svc).await,
        (_, path) if ROUTES.iter().any(|(_, p)| *p == path) => {
            error_json(StatusCode::MethodNotAllowed, "method not allowed")
        }
        _ => error_json(StatusCode::NotFound, "no such route"),
    };
    debug!(
        target: "tailord",
        method = %req.method,
        route = req.route(),
        status = resp.code.as_u16(),
        "request handled"
    );
    resp
}
