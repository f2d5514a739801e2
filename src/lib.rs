pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod play_order;
pub mod playlist;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod ui;
pub mod watchdog;
