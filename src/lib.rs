// src/lib.rs

//! Site Mirror Library
//!
//! Keeps a static copy of a dynamic website in an object store, driven by
//! the site's "recently updated" feed.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
