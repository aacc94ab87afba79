pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod relation;
pub mod select;
pub mod services;
pub mod stages;

pub use audit::{AuditEvent, AuditLog, EventKind};
pub use config::SyncConfig;
pub use engine::{Reconciliation, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
pub use key::{Identity, PersonKey};
pub use relation::{Dataset, OpenMode, Relation};
pub use services::{MoveRequest, RosterServices, TabularServices};
