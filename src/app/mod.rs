pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod events;
pub mod log_book;
pub mod logging;
pub mod models;
pub mod presence;
pub mod state;
pub mod transfer;
