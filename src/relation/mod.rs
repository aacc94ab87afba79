//! Relation Access Layer
//!
//! Named tables of string records, addressed by header name. A dataset is a
//! directory with one CSV file per relation.

pub mod dataset;
pub mod table;

pub use dataset::{Dataset, OpenMode};
pub use table::{FieldMap, Record, Relation, RowPos};
