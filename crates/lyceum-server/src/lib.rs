pub mod handlers;
pub mod rpc;
pub mod server;

pub use server::{start, AppState, ServerConfig, ServerHandle};
