pub mod api_v1;

use actix_web::HttpResponse;

/// Default 404 handler (must be registered last).
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "Not Found", "code": "not_found" }))
}
