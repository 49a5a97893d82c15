mod client;

pub use client::QdrantStore;
