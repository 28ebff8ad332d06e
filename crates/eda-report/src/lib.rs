//! Hand-off of the aggregate tables: files on disk for the chart layer and a
//! plain-text run summary for the terminal.

pub mod summary;
pub mod writer;

pub use summary::render_summary;
pub use writer::{OutputFormat, TableRow, TableWriter};
