pub mod audio;
pub mod config;
pub mod error;
pub mod kernel;
pub mod media;
pub mod services;
pub mod session;
pub mod vision;

pub use config::ProctorConfig;
pub use error::{ProctorError, Result};
pub use session::{Collaborators, MonitoringSessionController, MonitoringStatus, SessionCallbacks};
