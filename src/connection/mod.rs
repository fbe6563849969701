//! Connection strings and connect options.

pub mod options;
pub mod uri;

pub use options::ConnectOptions;
pub use uri::ConnectionString;
