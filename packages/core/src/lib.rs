// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod config;
pub mod error;
pub mod notifier;
pub mod scheduler;
pub mod services;
pub mod state;

// Only needed by the binary; public so `main.rs` can reach them.
pub mod cli;
pub mod logging;
