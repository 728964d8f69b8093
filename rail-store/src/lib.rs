//! Entity mapping and batch loading for a rail network store.
//!
//! Rows are mirrored as entities that keep one shared instance per key.
//! Mappers and selectors turn many individual lookups into a single
//! round trip by registering keys in a session and resolving them
//! together, and write changes back with batched upserts.

pub mod cache;
pub mod config;
pub mod domain;
pub mod driver;
pub mod entity;
pub mod mapper;
pub mod network;
pub mod query;
pub mod stations;
