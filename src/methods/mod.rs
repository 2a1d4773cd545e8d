//! Built-in Methods
//!
//! Concrete method implementations live with their domain packages; this
//! crate only ships the generic [`shell`] method so generated rule files
//! and descriptions are executable without further registration.

pub mod shell;

pub use shell::ShellMethod;
