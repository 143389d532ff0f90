pub mod store;
pub mod sync;
pub mod types;

pub use types::*;
