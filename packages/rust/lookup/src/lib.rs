//! CSV attribute lookup tables for cityprep.
//!
//! A lookup table pairs building identifiers with attribute values and tags
//! every column with the schema it targets (`bldg` or `gen`). See
//! [`AttributeTable`] for the accepted file shape.

pub mod table;

pub use table::{AttributeTable, ColumnSpec, TableRow};
