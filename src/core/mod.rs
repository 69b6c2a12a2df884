pub mod entities;
pub mod reply;
