pub mod client;

pub use client::{DocumentSource, Downloader};
