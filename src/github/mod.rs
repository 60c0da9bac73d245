pub mod client;
pub mod rest;

pub use client::GitHubClient;
pub use rest::{RestClient, RestError};
