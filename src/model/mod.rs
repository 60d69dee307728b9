//! Data model for cells, generic rows and typed records

mod record;
mod row;
mod types;
mod value;

pub use record::{Binding, BindingTable, BindingTableBuilder, FieldValues, Record};
pub use row::{Cell, Row};
pub use types::{KeyKind, TypeTag};
pub use value::{is_whole_millis, FromValue, Value};
