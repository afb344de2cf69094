//! Hosting shell for RETRO images on the Nga virtual machine
//!
//! The [`Shell`] owns a [`nga::Vm`] and its device table, keeps track of the
//! image's `interpret` and not-found entry points, and feeds it tokens from
//! literate source files.
#![warn(missing_docs)]

mod shell;
pub mod source;

pub use shell::{Interface, Shell};
