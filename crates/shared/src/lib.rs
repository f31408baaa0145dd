//! Shared infrastructure for the LabPortal workspace.
//!
//! Database pool construction, migrations, and the [`TenantId`] newtype that
//! threads the resolved tenant through every data-access call.

pub mod db;
pub mod tenant;

pub use db::{create_pool, run_migrations};
pub use tenant::TenantId;
