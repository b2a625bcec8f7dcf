pub mod error;
pub mod key;

pub use error::{Result, ShardError};
pub use key::ShardKey;
