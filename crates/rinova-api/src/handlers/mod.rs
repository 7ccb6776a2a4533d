//! HTTP handlers, grouped by surface.

pub mod admin;
pub mod extraction;
pub mod notes;
pub mod system;
