pub mod capabilities;
pub mod chat;
pub mod config;
pub mod hints;
pub mod route;
pub mod setup;
