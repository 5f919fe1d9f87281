pub mod column;
pub mod table;
pub mod value;

pub use column::Column;
pub use table::{Table, TableError};
pub use value::{DataType, Value};
