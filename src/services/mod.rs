// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - context resolution and session state.

pub mod context_store;
pub mod key_storage;
pub mod notifier;
pub mod permissions;
pub mod repository;
pub mod sessions;

pub use context_store::{
    select_active_context, ContextState, ContextStore, Degradation, LoadPhase, StoreOptions,
};
pub use key_storage::{ContextKeyStorage, FileKeyStorage, MemoryKeyStorage, StorageError};
pub use notifier::{ContextChangeNotifier, ContextChanged, ContextSubscription};
pub use repository::{ContextRepository, GroupFetcher};
pub use sessions::SessionRegistry;
