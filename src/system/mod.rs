pub mod boot;
pub mod packages;
pub mod platform;
pub mod python;
pub mod services;
pub mod systemd;
