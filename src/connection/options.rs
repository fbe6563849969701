use crate::core::document::{flag, omit};
use bson::{Bson, Document};
use std::time::Duration;

pub const AUTO_RECONNECT: &str = "autoReconnect";
pub const RECONNECT_TRIES: &str = "reconnectTries";
pub const RECONNECT_INTERVAL: &str = "reconnectInterval";
pub const USE_UNIFIED_TOPOLOGY: &str = "useUnifiedTopology";

/// Reconnection tuning that has no meaning under the unified topology
pub const LEGACY_RECONNECT_OPTIONS: [&str; 3] =
    [AUTO_RECONNECT, RECONNECT_TRIES, RECONNECT_INTERVAL];

/// Options bag passed to `connect`
///
/// Recognised legacy keys get builder methods; anything else goes through
/// [`ConnectOptions::set`] and reaches the driver untouched.
///
/// # Examples
///
/// ```ignore
/// let options = ConnectOptions::new()
///     .use_unified_topology(true)
///     .auto_reconnect(true)
///     .reconnect_tries(30);
///
/// // autoReconnect and reconnectTries are dropped before the driver sees them
/// let forwarded = options.normalized();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    bag: Document,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_reconnect(self, enabled: bool) -> Self {
        self.set(AUTO_RECONNECT, enabled)
    }

    pub fn reconnect_tries(self, tries: i32) -> Self {
        self.set(RECONNECT_TRIES, tries)
    }

    pub fn reconnect_interval(self, interval: Duration) -> Self {
        let millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self.set(RECONNECT_INTERVAL, millis)
    }

    pub fn use_unified_topology(self, enabled: bool) -> Self {
        self.set(USE_UNIFIED_TOPOLOGY, enabled)
    }

    /// Set an arbitrary driver option
    pub fn set(mut self, key: &str, value: impl Into<Bson>) -> Self {
        self.bag.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.bag.get(key)
    }

    pub fn is_unified_topology(&self) -> bool {
        flag(&self.bag, USE_UNIFIED_TOPOLOGY)
    }

    /// The bag the driver should receive: the legacy reconnection options
    /// are removed whenever the unified topology is requested.
    pub fn normalized(&self) -> Document {
        if self.is_unified_topology() {
            omit(&self.bag, &LEGACY_RECONNECT_OPTIONS)
        } else {
            self.bag.clone()
        }
    }

    pub fn into_document(self) -> Document {
        self.bag
    }
}

impl From<Document> for ConnectOptions {
    fn from(bag: Document) -> Self {
        Self { bag }
    }
}
