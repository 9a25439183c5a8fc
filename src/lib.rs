//! A single-process relational engine: typed tables, condition-string
//! selection, inner joins, grouping with aggregates, an extendible hash
//! index and an external merge sort.

pub mod aggregate;
pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod external_sort;
pub mod hash_index;
pub mod join;
pub mod parser;
pub mod predicate;
pub mod storage;

pub use config::EngineConfig;
pub use engine::{Engine, OrderedIndex, SelectQuery};
pub use error::{EngineError, EngineResult};
pub use external_sort::ExternalMergeSort;
pub use hash_index::ExtendibleHashIndex;
pub use join::JoinStrategy;
pub use storage::{Column, DataType, Table, TableSnapshot, Value};
