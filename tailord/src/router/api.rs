use tailor_api::request::{parse_page, ClickRequest, HistoryParams, QueryParams, SearchParams};
use tailor_api::status::StatusCode;

use crate::error::ServiceError;
use crate::proto::http_like::{Request, Response};
use crate::services::Services;

use super::util::{error_json, ok_json, service_error, user_handle};

pub async fn handle_search(req: &Request, svc: &Services) -> Response {
    let params = QueryParams::parse(req.query());
    let search = match SearchParams::from_query(&params) {
        Ok(p) => p,
        Err(e) => return service_error(&e.into()),
    };
    match svc.search(user_handle(req), &search.q, search.page).await {
        Ok(resp) => ok_json(&resp),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_click(req: &Request, svc: &Services) -> Response {
    let click = match ClickRequest::from_json(&req.body) {
        Ok(c) => c,
        Err(e) => return service_error(&e.into()),
    };
    match svc.record_click(user_handle(req), click).await {
        Ok(ack) => ok_json(&ack),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_click_history(req: &Request, svc: &Services) -> Response {
    match svc.click_history(user_handle(req)).await {
        Ok(resp) => ok_json(&resp),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_history(req: &Request, svc: &Services) -> Response {
    let params = QueryParams::parse(req.query());
    let mode = match HistoryParams::from_query(&params) {
        Ok(m) => m,
        Err(e) => return service_error(&e.into()),
    };
    match svc.history(user_handle(req), mode).await {
        Ok(resp) => ok_json(&resp),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_clear_history(req: &Request, svc: &Services) -> Response {
    match svc.clear_history(user_handle(req)).await {
        Ok(resp) => ok_json(&resp),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_recommendations(req: &Request, svc: &Services) -> Response {
    let params = QueryParams::parse(req.query());
    let page = match parse_page(params.get("page")) {
        Ok(p) => p,
        Err(e) => return service_error(&e.into()),
    };
    match svc.recommend(user_handle(req), page).await {
        Ok(resp) => ok_json(&resp),
        Err(e) => service_error(&e),
    }
}

pub async fn handle_ready(svc: &Services) -> Response {
    match svc.ready().await {
        Ok(()) => ok_json(&serde_json::json!({
            "status": "ready",
            "store": svc.store().backend(),
            "index": svc.engine().engine_name(),
        })),
        Err(ServiceError::Unavailable(_)) => error_json(StatusCode::ServiceUnavailable, "not ready"),
        Err(e) => service_error(&e),
    }
}
