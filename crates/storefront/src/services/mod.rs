//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Email and password accounts
//! - `catalog` - Product listing with a cached first page
//! - `cart` - Per-request cart state holder
//! - `checkout` - Cart to order conversion
//! - `admin` - Dashboard loading and admin writes
//! - `realtime` - Order status push hub

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod realtime;
