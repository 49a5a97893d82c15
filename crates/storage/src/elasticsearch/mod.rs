mod client;

pub use client::EsClient;
