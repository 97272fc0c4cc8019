pub mod executions;
pub mod templates;
pub mod types;

use actix_web::{
    web, Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};

use crate::auth::middleware::require_actor;
use crate::repository::ProtocolRepository;

/// CSRF protection for REST API mutation endpoints.
///
/// Rejects POST/PUT/DELETE requests that don't have Content-Type: application/json.
/// GET requests are exempt (read-only, no state changes).
async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method().clone();

    if method == actix_web::http::Method::POST
        || method == actix_web::http::Method::PUT
        || method == actix_web::http::Method::DELETE
    {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json") {
            let body = serde_json::json!({
                "error": "Content-Type must be application/json for mutation requests",
                "code": "unsupported_content_type",
            });
            let response = HttpResponse::BadRequest().json(body);
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

/// Configure API v1 routes for a service backed by `R`.
pub fn configure<R: ProtocolRepository + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .wrap(actix_web::middleware::from_fn(require_actor))
            .wrap(actix_web::middleware::from_fn(require_json_content_type))
            // Templates: /active and /seed BEFORE any {id} segment
            .route("/catalog/{alert_type}", web::get().to(templates::catalog_steps::<R>))
            .route("/orgs/{org_id}/templates", web::get().to(templates::list::<R>))
            .route("/orgs/{org_id}/templates", web::post().to(templates::create::<R>))
            .route("/orgs/{org_id}/templates/active/{alert_type}", web::get().to(templates::active::<R>))
            .route("/orgs/{org_id}/templates/seed", web::post().to(templates::seed::<R>))
            .route("/templates/{id}", web::get().to(templates::read::<R>))
            .route("/templates/{id}", web::put().to(templates::update::<R>))
            .route("/templates/{id}", web::delete().to(templates::delete::<R>))
            // Executions
            .route("/alerts/{alert_id}/executions", web::post().to(executions::start::<R>))
            .route("/alerts/{alert_id}/executions", web::get().to(executions::list_for_alert::<R>))
            .route("/executions/{id}", web::get().to(executions::read::<R>))
            .route("/executions/{id}/steps/{order}", web::post().to(executions::complete_step::<R>))
            .route("/executions/{id}/escalate", web::post().to(executions::escalate::<R>))
            .route("/executions/{id}/closure", web::get().to(executions::closure::<R>))
            .route("/executions/{id}/close", web::post().to(executions::close::<R>))
            .route("/executions/{id}/sla", web::get().to(executions::sla::<R>))
    );
}
