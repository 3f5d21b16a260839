pub mod client;
pub mod handlers;
pub mod routes;

pub use client::HttpCellClient;
