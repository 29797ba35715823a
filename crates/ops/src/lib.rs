//! krb ops: the recycle and restore orchestrators, plus operator queries over the records.

#![forbid(unsafe_code)]

mod inventory;
mod recycle;
mod restore;
mod retry;

pub use inventory::{Batch, Inventory, ItemFilter, PolicyFilter};
pub use recycle::{DeleteNotification, RecycleOutcome, Recycler};
pub use restore::{RestoreReport, RestoreStage, Restorer};
pub use retry::create_with_retry;
