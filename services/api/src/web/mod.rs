pub mod channel;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod rest;
pub mod session;
pub mod state;
pub mod sync_task;
pub mod ws_handler;

// Re-export the handlers the binary wires into the router.
pub use rest::{create_session_handler, store_token_handler, verify_purchase_handler};
pub use session::require_session;
pub use ws_handler::ws_handler;
