//! Ratekeeper - GCRA Rate Limiting
//!
//! This crate implements per-key request-rate limiting using the Generic
//! Cell Rate Algorithm (GCRA). Limit state is a single theoretical arrival
//! time (TAT) per (subject, limit) pair, persisted in a pluggable store:
//! an in-process map for single-node deployments, or Redis with atomic
//! compare-and-set for multi-node consistency.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
