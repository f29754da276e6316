//! Integration tests for contrail-init
//!
//! # Test Organization
//!
//! - `route_table`: reading the default gateway from a routing table file
//! - `identity`: resolving the node identity from interfaces and routes
//! - `credentials`: key, request and bundle handling
//! - `cli`: flags and environment mapped into bootstrap settings

mod cli;
mod credentials;
mod helpers;
mod identity;
mod route_table;
