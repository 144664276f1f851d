pub mod config_controller;
pub mod health_controller;
pub mod segment_controller;
pub mod stream_controller;
