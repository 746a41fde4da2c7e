pub mod config;
pub mod error;
pub mod graceful_shutdown;
pub mod named;
pub mod service;
pub mod store;
pub mod zone;

pub use config::ManagerConfig;
pub use error::{ErrorKind, ManagerError};
pub use service::ZoneService;
