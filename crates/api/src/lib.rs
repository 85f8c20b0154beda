//! HTTP surface of the autoblog job engine.

pub mod app;
pub mod config;
pub mod middleware;
