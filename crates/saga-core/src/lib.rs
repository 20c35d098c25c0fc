pub mod cancel;
pub mod config;
pub mod error;
pub mod iso_week;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Current RFC 3339 timestamp (UTC).
pub fn now_rfc3339() -> String {
    format_rfc3339(time::OffsetDateTime::now_utc())
}

/// Format a timestamp as RFC 3339.
pub fn format_rfc3339(ts: time::OffsetDateTime) -> String {
    ts.format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting should not fail")
}
