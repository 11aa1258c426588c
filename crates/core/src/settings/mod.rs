//! Group settings: typed schema, optimistic mutation, and the persistent cache seam.

mod memory_cache;
mod optimistic_mutation;
mod settings_ledger;
mod settings_model;
mod settings_traits;

pub use memory_cache::InMemorySettingsCache;
pub use optimistic_mutation::OptimisticMutationCoordinator;
pub use settings_ledger::{
    Confirmation, RefreshResolution, RefreshTicket, Rollback, SettingsLedger,
};
pub use settings_model::*;
pub use settings_traits::{SettingsCacheTrait, SettingsRemoteTrait};
