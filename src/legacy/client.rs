use super::database::LegacyDb;
use super::dispatch::{Pending, legacy_call};
use super::wrap::{Emulated, surface};
use crate::connection::{ConnectOptions, ConnectionString};
use crate::driver::Driver;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{info, warn};

pub const CLIENT_OVERRIDES: &[&str] = &["connect"];

/// Legacy entry point
///
/// `connect` resolves to the default database named in the URI rather than
/// to a client, the way the old driver did.
///
/// # Examples
///
/// ```ignore
/// use legacy_mongo_shim::{MongoClient, memory::MemoryDriver};
///
/// let client = MongoClient::new(MemoryDriver::new());
///
/// // promise form
/// let db = client.connect("mongodb://localhost:27017/testdb").await?;
///
/// // callback form
/// client.connect("mongodb://localhost:27017/testdb").callback(|result| {
///     let db = result.expect("connected");
///     assert!(db.is_emulated());
/// });
/// ```
#[derive(Clone)]
pub struct MongoClient {
    shadow: Emulated<Arc<dyn Driver>>,
}

impl MongoClient {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_driver(Arc::new(driver))
    }

    pub fn from_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            shadow: Emulated::new(driver),
        }
    }

    pub fn connect(&self, uri: impl Into<String>) -> ConnectCall {
        ConnectCall {
            driver: Arc::clone(&*self.shadow),
            uri: uri.into(),
            options: ConnectOptions::new(),
        }
    }

    pub fn surface(&self) -> Vec<&'static str> {
        surface(self.shadow.operations(), CLIENT_OVERRIDES)
    }
}

impl Deref for MongoClient {
    type Target = Emulated<Arc<dyn Driver>>;

    fn deref(&self) -> &Self::Target {
        &self.shadow
    }
}

pub struct ConnectCall {
    driver: Arc<dyn Driver>,
    uri: String,
    options: ConnectOptions,
}

impl ConnectCall {
    /// Options bag, either a raw document or a [`ConnectOptions`] builder
    pub fn options(mut self, options: impl Into<ConnectOptions>) -> Self {
        self.options = options.into();
        self
    }

    fn into_pending(self) -> Pending<LegacyDb> {
        let Self {
            driver,
            uri,
            options,
        } = self;

        Pending::new(async move {
            let client = driver.connect(&uri, options.normalized()).await?;

            let parsed = match ConnectionString::parse(&uri) {
                Ok(parsed) => parsed,
                Err(err) => {
                    // the driver already holds a live connection
                    if let Err(close_err) = client.close(true).await {
                        warn!(error = %close_err, "failed to close client after bad URI");
                    }
                    return Err(err);
                }
            };
            info!(
                uri = %parsed.to_url(),
                database = %parsed.default_database,
                "connected"
            );

            Ok(LegacyDb::new(client.db(&parsed.default_database), client))
        })
    }
}

legacy_call!(ConnectCall => LegacyDb);
