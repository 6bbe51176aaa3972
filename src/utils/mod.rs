pub mod error;
pub mod logger;
pub mod net;

pub use error::{P2pError, Result};
pub use logger::setup_logging;
