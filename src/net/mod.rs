//! Request/response model shared by the page and the cache controller.

mod client;
mod types;

pub use client::HttpNetwork;
pub use types::{Network, Request, Response, ResponseType};

#[cfg(test)]
pub mod fake;
