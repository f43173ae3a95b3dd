pub mod config;
pub mod layout;
pub mod matrix;
pub mod progress;
pub mod sample;
pub mod scale;
pub mod stats;
