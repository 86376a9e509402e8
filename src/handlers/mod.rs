pub mod actions;
pub mod auth;
pub mod daily_logs;
pub mod data;
pub mod health;
pub mod profile;
pub mod stats;
pub mod ws;
