pub mod alerts;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod outcome;
pub mod paths;
pub mod rates;
pub mod registry;
pub mod store;
pub mod threshold;
pub mod tracker;
pub mod types;
pub mod weights;

pub use error::{CusumError, Result};
