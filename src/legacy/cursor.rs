use super::wrap::{Emulated, surface};
use crate::core::Result;
use crate::driver::CursorHandle;
use bson::{Bson, Document};
use std::ops::{Deref, DerefMut};

pub const CURSOR_OVERRIDES: &[&str] =
    &["project", "sort", "limit", "skip", "hint", "next", "next_object", "to_array"];

/// Cursor with the legacy name for advance-and-fetch
///
/// The modifiers consume and return the adapter itself, so a chain such as
/// `find(..).sort(..).limit(..)` stays on the emulated cursor at every link.
pub struct LegacyCursor {
    shadow: Emulated<Box<dyn CursorHandle>>,
}

impl LegacyCursor {
    pub fn new(cursor: Box<dyn CursorHandle>) -> Self {
        Self {
            shadow: Emulated::new(cursor),
        }
    }

    pub fn project(mut self, projection: Document) -> Self {
        self.shadow.project(projection);
        self
    }

    pub fn sort(mut self, spec: Document) -> Self {
        self.shadow.sort(spec);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.shadow.limit(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        CursorHandle::skip(&mut **self.shadow, skip);
        self
    }

    pub fn hint(mut self, hint: impl Into<Bson>) -> Self {
        self.shadow.hint(hint.into());
        self
    }

    pub async fn next(&mut self) -> Result<Option<Document>> {
        CursorHandle::next(&mut **self.shadow).await
    }

    /// Legacy name of [`LegacyCursor::next`]
    pub async fn next_object(&mut self) -> Result<Option<Document>> {
        self.next().await
    }

    pub async fn to_array(&mut self) -> Result<Vec<Document>> {
        self.shadow.to_array().await
    }

    pub fn surface(&self) -> Vec<&'static str> {
        surface(self.shadow.operations(), CURSOR_OVERRIDES)
    }
}

impl Deref for LegacyCursor {
    type Target = Emulated<Box<dyn CursorHandle>>;

    fn deref(&self) -> &Self::Target {
        &self.shadow
    }
}

impl DerefMut for LegacyCursor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.shadow
    }
}

impl std::fmt::Debug for LegacyCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyCursor").finish_non_exhaustive()
    }
}
