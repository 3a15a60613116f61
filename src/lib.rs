//! Tollgate - Admission Control Engine
//!
//! This crate decides whether a client's request may proceed. It provides
//! token bucket, sliding window and fixed window limiters that keep their
//! per-client state either in-process or in a shared key-value store, and
//! composes them per client tier and per endpoint. When the shared store is
//! unreachable, limiters fall back to local state without surfacing errors.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
