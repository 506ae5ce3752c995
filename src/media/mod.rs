pub mod cleanup;
pub mod import;
pub mod index;
