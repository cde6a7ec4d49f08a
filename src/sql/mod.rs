//! SQL generation: dialects, SELECT compilation, write statements and the
//! values bound to them.

pub mod compiler;
pub mod dialect;
pub mod value;
mod write;

pub use compiler::{
    CompiledQuery, JoinedNavigation, OutputColumn, ParentLink, SelectSpec, SqlCompiler,
    Statement, PARENT_KEY_COLUMN,
};
pub use dialect::{DatePart, Dialect, DialectKind};
pub use value::SqlValue;
pub use write::Assignments;
