//! visreg Fixture Server
//!
//! Serves the project's test fixtures over HTTP for the visual-regression
//! run and for interactive development:
//! - static files from the configured root, with optional directory listing
//! - dynamically rendered test pages under a configurable prefix
//! - optional live reload of open pages on file changes

pub mod dynamic;
pub mod livereload;
pub mod server;
pub mod static_files;

pub use dynamic::{render_test_page, PageError};
pub use livereload::ReloadHub;
pub use server::{ServerHandle, WebServer};
