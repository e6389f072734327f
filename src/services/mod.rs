/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Join codes for rooms.
pub mod room_code;
/// Background purge of long-expired rooms.
pub mod room_janitor;
/// Room lifecycle, membership, shared state and channel tokens.
pub mod room_service;
/// Per-user puzzle saves.
pub mod saves_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;

#[cfg(test)]
pub(crate) mod test_support;
