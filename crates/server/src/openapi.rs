//! OpenAPI document assembly and the Swagger UI mount.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Coordination Core API",
        description = "Read-only HTTP surface over project state. Mutations go through the /ws/{project_id} connection hub.",
        version = "0.1.0"
    ),
    paths(
        crate::routes::http::list_projects,
        crate::routes::http::project_status,
        crate::routes::http::list_agents,
        crate::routes::http::list_tasks,
        crate::routes::http::list_leases,
        crate::routes::http::replay_log,
    ),
    tags(
        (name = "projects", description = "Project discovery and state"),
    )
)]
pub struct ApiDoc;

pub fn swagger_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
}
