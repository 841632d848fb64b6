pub mod config;
pub mod error;
pub mod openrtb;
pub mod outcome;
pub mod slot;

pub use config::AppConfig;
pub use error::{HbError, HbResult};
pub use outcome::{ErrorKind, Outcome, RequestError};
pub use slot::SlotConfiguration;
