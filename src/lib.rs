//! Version-gated local cache for a multi-tenant dealership backend.

pub mod backend;
pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
