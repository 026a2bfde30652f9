//! Core data models for the post service.

pub mod post;

pub use post::{Location, Post};
