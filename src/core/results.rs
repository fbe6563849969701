//! Result types returned by drivers, plus the legacy write-result shape.

use super::error::Result;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// Identifiers in insertion order
    pub inserted_ids: Vec<Bson>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

/// What a legacy `insert` resolves to: whichever of the two new-driver
/// insert operations it was routed to.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    One(InsertOneResult),
    Many(InsertManyResult),
}

impl InsertOutcome {
    pub fn inserted_count(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(result) => result.inserted_ids.len(),
        }
    }

    pub fn inserted_ids(&self) -> Vec<Bson> {
        match self {
            Self::One(result) => vec![result.inserted_id.clone()],
            Self::Many(result) => result.inserted_ids.clone(),
        }
    }
}

/// Command status block of a legacy write result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub n: u64,
    #[serde(rename = "nModified")]
    pub n_modified: u64,
    pub ok: i32,
}

/// Legacy `update` result: `{ result: { n, nModified, ok } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub result: CommandStatus,
    #[serde(rename = "upsertedId", skip_serializing_if = "Option::is_none", default)]
    pub upserted_id: Option<Bson>,
}

impl WriteResult {
    pub fn acknowledged(n: u64, n_modified: u64) -> Self {
        Self {
            result: CommandStatus { n, n_modified, ok: 1 },
            upserted_id: None,
        }
    }

    pub fn n_modified(&self) -> u64 {
        self.result.n_modified
    }

    /// Renders the result as the document legacy callers inspected.
    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }
}

impl From<UpdateResult> for WriteResult {
    fn from(result: UpdateResult) -> Self {
        let upserted = u64::from(result.upserted_id.is_some());
        Self {
            result: CommandStatus {
                n: result.matched_count + upserted,
                n_modified: result.modified_count,
                ok: 1,
            },
            upserted_id: result.upserted_id,
        }
    }
}
