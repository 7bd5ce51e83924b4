//! Client for the admin update API.

mod client;
mod queries;

pub use client::AdminClient;
