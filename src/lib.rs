//! Windowgate - Sliding-Window Rate Limiting Gate
//!
//! This crate implements a rate limiting layer that sits in front of an HTTP
//! request pipeline. Requests under protected path prefixes are attributed to
//! a caller, counted in a per-caller sliding window, and rejected with a 429
//! once the caller exceeds its quota. Windows live in a pluggable store: an
//! in-process map for single instances or Redis for a shared count.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
