//! Generic provisioning building blocks: templates and desired-state files.

pub mod state;
pub mod template;
pub mod templates;
