pub mod document;
pub mod error;
pub mod results;
pub mod value;

pub use error::{DbError, Result};
pub use results::{
    CommandStatus, DeleteResult, InsertManyResult, InsertOneResult, InsertOutcome, UpdateResult,
    WriteResult,
};
pub use value::ValueExt;
