pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod render;
pub mod sanitize;
pub mod state;
pub mod storage;
pub mod ui;

pub use error::{Error, Result};
