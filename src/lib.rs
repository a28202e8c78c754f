pub mod db;
pub mod error;
pub mod server;

pub use error::{PingTaskError, Result};
