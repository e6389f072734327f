/// Entity definitions shared by every storage backend.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Persistence trait for rooms and saves, plus its backends.
pub mod store;
