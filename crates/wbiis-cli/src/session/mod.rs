//! Search session state.

pub mod manager;

pub use manager::SearchSession;
