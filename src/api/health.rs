use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the store answers within the storage deadline.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.ping().await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_test_db;
    use crate::config::Config;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_checks_storage() {
        let (repo, _temp) = setup_test_db().await;
        let env = HashMap::from([("DATABASE_PATH".to_string(), "unused.db".to_string())]);
        let state = AppState::new(Arc::new(repo), Config::from_env_map(env).unwrap());

        let Json(body) = ready(State(state.clone())).await.unwrap();
        assert_eq!(body["status"], "ready");

        state.repo.close().await;
        let err = ready(State(state)).await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }
}
