// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DESTROYED: &str = "room.destroyed";
pub const RUN_STARTED: &str = "sandbox.run.started";
pub const RUN_COMPLETED: &str = "sandbox.run.completed";
pub const COMPILE_FAILED: &str = "sandbox.compile.failed";
pub const CHAT_MESSAGES: &str = "chat.messages";
