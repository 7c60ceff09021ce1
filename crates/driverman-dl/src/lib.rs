pub mod archive;
pub mod cache;
pub mod download;
pub mod error;
pub mod http_client;
pub mod types;
pub mod utils;
