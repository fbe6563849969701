//! Callback-or-promise dispatch.
//!
//! Legacy callers either handed every operation a trailing callback or
//! used the returned promise. Every I/O-performing legacy operation here
//! produces a [`Pending`] (directly or through a call builder), which can be
//! `.await`ed or given a callback. Both channels carry the same `Result`.

use crate::core::{DbError, Result};
use futures::future::BoxFuture;
use std::future::{Future, IntoFuture};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// A legacy operation that has not been dispatched yet
#[must_use = "a pending operation does nothing until awaited or given a callback"]
pub struct Pending<T> {
    future: BoxFuture<'static, Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Callback form: runs the operation as a task on the current tokio
    /// runtime and hands the outcome, success or error, to `callback`.
    ///
    /// Outside a runtime nothing is spawned: `callback` is invoked at once
    /// with [`DbError::Connection`] and `None` is returned.
    pub fn callback<F>(self, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                let outcome = self.future.await;
                callback(outcome);
            })),
            Err(err) => {
                warn!(error = %err, "legacy callback issued outside a tokio runtime");
                callback(Err(DbError::Connection(format!(
                    "callback form requires a tokio runtime: {}",
                    err
                ))));
                None
            }
        }
    }
}

impl<T: Send + 'static> IntoFuture for Pending<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

/// Makes a call builder awaitable and callback-capable.
///
/// The builder must provide `fn into_pending(self) -> Pending<$output>`.
macro_rules! legacy_call {
    ($call:ty => $output:ty) => {
        impl ::std::future::IntoFuture for $call {
            type Output = $crate::core::Result<$output>;
            type IntoFuture = ::futures::future::BoxFuture<'static, Self::Output>;

            fn into_future(self) -> Self::IntoFuture {
                ::std::future::IntoFuture::into_future(self.into_pending())
            }
        }

        impl $call {
            /// Callback form of this call
            pub fn callback<F>(self, callback: F) -> ::std::option::Option<::tokio::task::JoinHandle<()>>
            where
                F: FnOnce($crate::core::Result<$output>) + Send + 'static,
            {
                self.into_pending().callback(callback)
            }
        }
    };
}

pub(crate) use legacy_call;
