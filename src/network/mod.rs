pub mod hotspot;
pub mod powersave;
pub mod wifi;
