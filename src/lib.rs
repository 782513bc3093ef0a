pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use routes::create_router;
pub use state::{AppState, StoreSnapshot};
