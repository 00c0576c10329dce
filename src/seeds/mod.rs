//! Database seeding functionality
//!
//! This module provides functionality to seed the database with initial
//! data, currently just the platform catalog.

pub mod platform;

pub use platform::seed_platforms;
