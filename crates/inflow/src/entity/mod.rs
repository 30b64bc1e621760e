//! SeaORM entity definitions for the inflow database schema.

pub mod issue;
pub mod prelude;
pub mod scope;
pub mod sync_checkpoint;
