use actix_web::HttpResponse;

/// Liveness probe. Does not touch the stores.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
}
