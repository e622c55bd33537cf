use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};

#[derive(Serialize)]
pub struct RoleDto {
    pub role_id: i32,
    pub role_name: String,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct PermissionDto {
    pub permission_id: i32,
    pub name: String,
}

/// GET /admin/roles
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<RoleDto>>>, ApiError> {
    let roles = state
        .store()
        .find_all_roles()
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(|r| RoleDto {
            role_id: r.role_id,
            role_name: r.role_name,
            description: r.description,
        })
        .collect();

    Ok(Json(ApiResponse::success(roles)))
}

/// GET /admin/permissions
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<PermissionDto>>>, ApiError> {
    let permissions = state
        .store()
        .find_all_permissions()
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(|p| PermissionDto {
            permission_id: p.permission_id,
            name: p.name,
        })
        .collect();

    Ok(Json(ApiResponse::success(permissions)))
}
