//! `synchron-sheets`: the remote tabular source the sync engine reads from.
//!
//! [`source::SheetSource`] is the seam the scheduler depends on;
//! [`google::GoogleSheetsClient`] implements it against the Google Drive and
//! Sheets REST APIs.

pub mod google;
pub mod source;

pub use google::GoogleSheetsClient;
pub use source::{Rows, SheetSource, SourceError, SourceInfo, TabInfo};
