pub mod api;
pub mod app;
pub mod config;
pub mod errors;
pub mod gate;
pub mod handlers;
pub mod meditation;
pub mod models;
pub mod profile_store;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod symptoms;
pub mod ui;
pub mod wellness;
pub mod wizard;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::FileStore;
