pub mod catalog;
pub mod config;
pub mod console;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod network;
pub mod pages;
pub mod progress;
pub mod qr;
pub mod server;
pub mod state;
pub mod utils;

pub use error::{Error, Result};
