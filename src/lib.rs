// ABOUTME: Library root for imgxfer - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod capacity;
pub mod catalog;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod janitor;
pub mod output;
pub mod registry;
pub mod repository;
pub mod run;
pub mod session;
pub mod ssh;
pub mod transfer;
pub mod verify;
