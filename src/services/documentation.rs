use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Crossword Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::update_color,
        crate::routes::rooms::switch_puzzle,
        crate::routes::rooms::issue_token,
        crate::routes::rooms::get_state,
        crate::routes::rooms::update_state,
        crate::routes::saves::list_saves,
        crate::routes::saves::bulk_import,
        crate::routes::saves::get_save,
        crate::routes::saves::upsert_save,
        crate::routes::saves::delete_save,
    ),
    components(
        schemas(
            crate::dto::StatusResponse,
            crate::dto::health::HealthResponse,
            crate::dto::rooms::CreateRoomRequest,
            crate::dto::rooms::SwitchPuzzleRequest,
            crate::dto::rooms::UpdateColorRequest,
            crate::dto::rooms::UpdateStateRequest,
            crate::dto::rooms::MemberView,
            crate::dto::rooms::RoomView,
            crate::dto::rooms::JoinResponse,
            crate::dto::rooms::MemberUpdateResponse,
            crate::dto::rooms::RoomStateResponse,
            crate::dto::saves::SaveRequest,
            crate::dto::saves::BulkImportRequest,
            crate::dto::saves::ImportResponse,
            crate::dto::saves::SaveAck,
            crate::dto::saves::SaveSummary,
            crate::dto::saves::SaveDetail,
            crate::realtime::ChannelToken,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Collaborative puzzle rooms"),
        (name = "saves", description = "Per-user puzzle progress"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_room_and_save_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();

        assert!(paths.contains(&"/api/rooms".to_string()));
        assert!(paths.contains(&"/api/rooms/{code}/token".to_string()));
        assert!(paths.contains(&"/api/saves/{puzzle_id}".to_string()));
        assert!(paths.contains(&"/healthcheck".to_string()));
    }

    #[test]
    fn room_responses_match_error_mapping() {
        let doc = ApiDoc::openapi();
        let statuses = |path: &str| {
            let item = &doc.paths.paths[path];
            item.put
                .as_ref()
                .map(|operation| operation.responses.responses.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let color = statuses("/api/rooms/{code}/color");
        for status in ["200", "400", "404", "409", "410"] {
            assert!(color.iter().any(|code| code == status), "color lacks {status}");
        }
        assert!(!color.iter().any(|code| code == "403"));

        let switch = statuses("/api/rooms/{code}/puzzle");
        for status in ["200", "400", "403", "404"] {
            assert!(switch.iter().any(|code| code == status), "switch lacks {status}");
        }
    }
}
