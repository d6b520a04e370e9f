//! Cascading reset service for event-scoped data.
//!
//! Given an event id, the service deletes every record generated while the event
//! was processed (invoices and their line items, payout allocations and their
//! lines, cars and their participants) and puts the event back to `draft` with
//! its totals zeroed. The event row itself is kept.
//!
//! # Architecture
//!
//! - **Graph**: the dependent collections are declared as edges in
//!   [`cascade::CascadeGraph`]; the engine walks them children-first
//! - **Storage**: SQLite with enforced foreign keys behind the
//!   [`cascade::PersistenceGateway`] trait
//! - **Access**: bearer-token authentication and a fail-closed role policy run
//!   before any store access
//! - **Transport**: `POST /reset-event` over HTTP (axum), plus a local CLI
//!
//! # Modules
//!
//! - [`auth`]: Bearer-token authentication, identity providers and authorization policies
//! - [`cascade`]: Dependency graph, persistence gateway and the reset engine
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema and migrations
//! - [`response`]: HTTP rendering of outcomes and errors
//! - [`server`]: axum router and server bootstrap
//! - [`service`]: The request pipeline tying authentication, authorization and the engine together

pub mod auth;
pub mod cascade;
pub mod config;
pub mod db;
pub mod response;
pub mod server;
pub mod service;
