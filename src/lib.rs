// Core infrastructure modules
pub mod config;
pub mod core;

// Feature-specific modules
pub mod chart;
pub mod command_palette;
pub mod data_mill;
pub mod insights;
pub mod record_form;
pub mod repl;
pub mod results_grid;
pub mod schema_navigator;
pub mod session;

#[cfg(test)]
mod test_utils;
