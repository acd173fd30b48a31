//! Database registry, pool abstraction and transaction coordination.
//!
//! Every cadence component reaches storage through a [`DatabaseRegistry`]:
//! a name → pool map built from the `database.yaml` document. Pools wrap
//! sqlx SQLite/PostgreSQL/MySQL pools behind one transactional interface;
//! callers supply backend-appropriate SQL (placeholder style is native to
//! each backend) and read rows through typed getters.
//!
//! Multi-database work goes through [`coordinator::transaction`], which
//! brackets a body future with one transaction per named database and
//! commits all or rolls back all (best effort, not two-phase commit).

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pool;
pub mod registry;
pub mod row;
pub mod schema;
pub mod tx;

pub use config::{DatabaseConfig, DatabasesConfig, DbKind, PoolSettings};
pub use coordinator::{current_tx, transaction};
pub use error::DbError;
pub use registry::{Database, DatabaseRegistry};
pub use row::DbRow;
pub use tx::{SqlParam, TxContext, TxMode};
