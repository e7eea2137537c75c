//! crewcal — shift-cycle calendar core with dual persistence
//!
//! Three fixed crews rotate through a shared 9-day shift pattern, each
//! anchored at its own start date. The crate derives any day's shift for any
//! crew, lets users override individual days, and keeps those overrides (plus
//! per-user settings) synchronized between a local JSON store and a remote
//! per-user document, depending on whether an identity is signed in.
//!
//! The pure derivation lives in [`cycle`] and [`holidays`]; the stateful sync
//! layer is [`store::ModificationStore`], driven by an [`identity::IdentityHub`]
//! emission stream; [`schedule::Schedule`] merges the two for presentation.

pub mod cycle;
pub mod error;
pub mod holidays;
pub mod identity;
pub mod local_store;
pub mod remote;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod types;
pub mod usage;

pub use error::StorageError;
pub use identity::{Identity, IdentityHub};
pub use local_store::LocalStore;
pub use remote::{DocumentStore, MemoryDocumentStore};
pub use schedule::Schedule;
pub use settings::{SettingsUpdate, Theme, UserSettings, WeekStartDay};
pub use store::ModificationStore;
pub use types::{Crew, ShiftCycleInfo, ShiftDay, ShiftModification, ShiftType, StorageData};
pub use usage::UsageTracker;
