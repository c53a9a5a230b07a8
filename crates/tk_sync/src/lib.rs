#[macro_use]
extern crate tracing;

pub mod config;
pub mod downloader;
pub mod error;
pub mod ledger;
pub mod locator;
pub mod session;
pub mod tabular;
pub mod utils;
