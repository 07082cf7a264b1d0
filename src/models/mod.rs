// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod context;
pub mod group;
pub mod profile;
pub mod session;

pub use context::{
    permission, CalendarScope, Context, ContextKey, ContextType, Relation, RoleDescriptor,
    RolePermissions,
};
pub use group::GroupSnapshot;
pub use profile::{AccountFlags, ProfileFlags, ProfileRole};
pub use session::{AuthEvent, AuthUser, Session};
