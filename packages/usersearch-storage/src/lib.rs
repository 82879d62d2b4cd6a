pub mod cache;
pub mod memory;
pub mod query;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
