pub mod api;
pub mod board;
pub mod clock;
pub mod config;
pub mod format;
pub mod model;

// Reconciliation pipeline
pub mod binder;
pub mod cache;
pub mod directory;
pub mod gateway;
pub mod poller;
pub mod scheduler;

// Engine loop
pub mod engine;

// In-memory backend for demo mode and tests
pub mod fake;
