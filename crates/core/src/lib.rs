//! Shopkeep Core - Shared domain types library.
//!
//! This crate provides the types and pure logic used across Shopkeep:
//! - `storefront` - Shop, checkout and admin dashboard web application
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. Everything here can be unit tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, statuses and addresses
//! - [`cart`] - Cart line aggregation and local-mirror mutations
//! - [`payment`] - Card brand detection, input formatting and validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod payment;
pub mod types;

pub use types::*;
