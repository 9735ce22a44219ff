//! Control plane HTTP adapter

pub mod client;

pub use client::HttpControlPlane;
