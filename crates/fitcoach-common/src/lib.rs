pub mod error;

pub use error::{Error, Result, root_cause};
