use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::bootstrap::app_context::AppContext;

/// Liveness endpoint, grounded on the teacher's `presentation/http/health.rs`:
/// a real `SELECT 1` against the metadata store, reporting "degraded"
/// rather than failing the request outright when the database is down.
pub async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&ctx.pool)
        .await
        .is_ok();
    let status = if db_ok { "ok" } else { "degraded" };
    Json(json!({ "status": status }))
}
