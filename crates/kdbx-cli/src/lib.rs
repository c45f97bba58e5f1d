//! Library side of the `kdbx-attach` command-line tool.

pub mod commands;
pub mod listing;
pub mod logging;
