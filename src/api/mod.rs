pub mod chat;
pub mod error;
pub mod tools;

pub use error::ApiError;
