pub mod align_ops;
pub mod config;
pub mod error;
pub mod routes;
pub mod save;
pub mod state;

pub use config::ServerConfig;
pub use routes::router;
pub use state::{AppState, SharedState};
