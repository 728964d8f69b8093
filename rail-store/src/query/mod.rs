//! Driver-independent SQL construction.
//!
//! Builders produce a [`Statement`]: SQL text with `@name` placeholders and
//! the ordered list of parameter names. They never touch a connection.
//! Builders are plain values; a mapper keeps one base query and clones it
//! per call site before adding predicates.

mod delete;
mod ident;
mod insert;
mod predicate;
mod select;
mod statement;
mod update;

pub use delete::Delete;
pub use ident::{indexed_param, param_base, quote_ident};
pub use insert::Insert;
pub use predicate::Filter;
pub use select::{Order, Select};
pub use statement::Statement;
pub use update::Update;
