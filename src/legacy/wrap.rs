//! Generic shadow wrapper.
//!
//! [`Emulated`] owns a handle to the underlying object and dereferences to
//! it, so every operation of the target stays callable on the shadow with
//! identical behaviour. Adapters put their overrides in front of it as
//! inherent methods; operations that conceptually return "self" are written
//! to return the adapter, never the target.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Introspection and identity members that are never part of a shadow's
/// forwarded surface: they would describe or expose the target rather than
/// the shadow.
pub const NEVER_FORWARD: &[&str] = &["operations", "as_any", "type_id", "clone", "drop", "into_inner"];

/// Shadow of `T` carrying the emulation marker
#[derive(Clone)]
pub struct Emulated<T> {
    target: T,
}

impl<T> Emulated<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    /// Marker checked by callers and tests to tell a shadow from the
    /// object it wraps.
    pub fn is_emulated(&self) -> bool {
        true
    }
}

impl<T> Deref for Emulated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> DerefMut for Emulated<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T> fmt::Debug for Emulated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emulated")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

/// Callable surface of a shadow: the target's operations in the order they
/// are advertised, then the adapter's own overrides and aliases, without
/// duplicates and without anything on [`NEVER_FORWARD`].
pub fn surface(inherited: &[&'static str], overrides: &[&'static str]) -> Vec<&'static str> {
    let mut members: Vec<&'static str> = Vec::with_capacity(inherited.len() + overrides.len());
    for name in inherited.iter().chain(overrides.iter()) {
        if NEVER_FORWARD.contains(name) || members.contains(name) {
            continue;
        }
        members.push(*name);
    }
    members
}
