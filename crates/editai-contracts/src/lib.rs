pub mod chat;
pub mod events;
pub mod models;
pub mod options;
pub mod session;
pub mod uploads;
