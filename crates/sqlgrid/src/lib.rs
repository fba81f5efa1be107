//! sqlgrid: split SQL scripts into statements, run them in order, and edit
//! the last result as a grid that commits back in one transaction.

pub mod commit;
pub mod config;
pub mod driver;
pub mod error;
pub mod grid;
pub mod runner;
pub mod sql;
pub mod util;

pub use commit::{CommitEngine, CommitPlan, CommitSummary};
pub use driver::{AnyDriver, Driver, ResultSet, TableRef, Value};
pub use error::{CommitError, DriverError, ExecutionError, ParseError, ValidationError};
pub use grid::ResultGrid;
pub use runner::{QueryRunner, RunOutcome};
pub use sql::{resolve_to_nearest_statement, split_sql_query, SqlDocument, StatementSpan};
