pub mod auth_gate;
pub mod reconnect_sync;
pub mod replica_registry;
pub mod room_registry;
pub mod snapshot_service;
