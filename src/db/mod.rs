//! Database layer - sessions, session cache, and structured inserts

pub mod factory;
pub mod session;

pub use factory::ConnectionFactory;
pub use session::{Backend, ColumnValue, InsertSpec, Session};
