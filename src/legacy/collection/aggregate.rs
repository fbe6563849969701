use crate::core::Result;
use crate::core::document::flag;
use crate::driver::CollectionHandle;
use crate::legacy::cursor::LegacyCursor;
use crate::legacy::dispatch::Pending;
use bson::Document;
use futures::future::{BoxFuture, FutureExt};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Aggregation stages as the caller supplied them
#[derive(Debug, Clone, PartialEq)]
pub enum Pipeline {
    /// One array of stages
    Array(Vec<Document>),
    /// Stages passed one by one
    Positional(Vec<Document>),
}

impl Pipeline {
    pub fn positional(stages: impl IntoIterator<Item = Document>) -> Self {
        Self::Positional(stages.into_iter().collect())
    }

    pub fn into_stages(self) -> Vec<Document> {
        match self {
            Self::Array(stages) | Self::Positional(stages) => stages,
        }
    }
}

impl From<Vec<Document>> for Pipeline {
    fn from(stages: Vec<Document>) -> Self {
        Self::Array(stages)
    }
}

impl From<Document> for Pipeline {
    fn from(stage: Document) -> Self {
        Self::Positional(vec![stage])
    }
}

impl<const N: usize> From<[Document; N]> for Pipeline {
    fn from(stages: [Document; N]) -> Self {
        Self::Positional(stages.into())
    }
}

/// Stages written out one by one, the way legacy callers passed them
///
/// ```ignore
/// let cursor = trees.aggregate(pipeline![
///     doc! { "$match": { "ohmy": true } },
///     doc! { "$count": "total" },
/// ]).await?;
/// ```
#[macro_export]
macro_rules! pipeline {
    ($($stage:expr),* $(,)?) => {
        $crate::legacy::Pipeline::positional(::std::vec![$($stage),*])
    };
}

/// What an aggregation hands to a callback
#[derive(Debug)]
pub enum AggregateReply {
    /// Every result, materialised
    Documents(Vec<Document>),
    /// The caller asked for cursor semantics explicitly
    Cursor(LegacyCursor),
}

impl AggregateReply {
    /// Materialise whichever form was delivered
    pub async fn into_documents(self) -> Result<Vec<Document>> {
        match self {
            Self::Documents(documents) => Ok(documents),
            Self::Cursor(mut cursor) => cursor.to_array().await,
        }
    }
}

/// Legacy `aggregate`
///
/// - `.callback(f)`: results are materialised before `f` runs, unless the
///   options explicitly request a cursor;
/// - `.options({ cursor: {..}, .. })`: passed through unmodified, the caller
///   gets a cursor in both forms;
/// - awaited or `.cursor()`: an unmaterialised cursor.
pub struct AggregateCall {
    target: Arc<dyn CollectionHandle>,
    pipeline: Pipeline,
    options: Option<Document>,
}

impl AggregateCall {
    pub(super) fn new(target: Arc<dyn CollectionHandle>, pipeline: Pipeline) -> Self {
        Self {
            target,
            pipeline,
            options: None,
        }
    }

    pub fn options(mut self, options: Document) -> Self {
        self.options = Some(options);
        self
    }

    /// Whether the caller opted into the new driver's cursor behaviour
    pub fn wants_cursor(&self) -> bool {
        self.options.as_ref().is_some_and(|options| flag(options, "cursor"))
    }

    pub fn cursor(self) -> LegacyCursor {
        let passthrough = self.wants_cursor();
        let Self {
            target,
            pipeline,
            options,
        } = self;

        let options = match options {
            Some(options) if passthrough => options,
            Some(_) => {
                debug!(
                    collection = target.name(),
                    "aggregate options without a cursor request are not forwarded"
                );
                Document::new()
            }
            None => Document::new(),
        };

        LegacyCursor::new(target.aggregate(pipeline.into_stages(), options))
    }

    pub fn callback<F>(self, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<AggregateReply>) + Send + 'static,
    {
        let passthrough = self.wants_cursor();
        let mut cursor = self.cursor();

        let pending = Pending::new(async move {
            if passthrough {
                Ok(AggregateReply::Cursor(cursor))
            } else {
                cursor.to_array().await.map(AggregateReply::Documents)
            }
        });
        pending.callback(callback)
    }
}

impl IntoFuture for AggregateCall {
    type Output = Result<LegacyCursor>;
    type IntoFuture = BoxFuture<'static, Result<LegacyCursor>>;

    fn into_future(self) -> Self::IntoFuture {
        let cursor = self.cursor();
        async move { Ok(cursor) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_pipeline_shapes_normalise() {
        let array = Pipeline::from(vec![doc! { "$match": {} }, doc! { "$limit": 1 }]);
        let positional = crate::pipeline![doc! { "$match": {} }, doc! { "$limit": 1 }];

        assert!(matches!(array, Pipeline::Array(_)));
        assert!(matches!(positional, Pipeline::Positional(_)));
        assert_eq!(array.into_stages(), positional.into_stages());
    }

    #[test]
    fn test_single_stage_and_fixed_arrays() {
        assert_eq!(Pipeline::from(doc! { "$limit": 1 }).into_stages().len(), 1);
        assert_eq!(
            Pipeline::from([doc! { "$skip": 1 }, doc! { "$limit": 1 }])
                .into_stages()
                .len(),
            2
        );
    }
}
