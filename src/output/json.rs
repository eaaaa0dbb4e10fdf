use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::report::PrescriptionReport;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// sha256 of the compact JSON encoding.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let serialized = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Report plus the run-specific stamp. The stamp never enters the report,
/// so the fingerprint stays stable across runs.
#[derive(Debug, Serialize)]
pub struct StampedReport<'a> {
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
    pub report: &'a PrescriptionReport,
}

impl<'a> StampedReport<'a> {
    pub fn new(report: &'a PrescriptionReport) -> Result<Self> {
        Ok(Self {
            fingerprint: fingerprint(report)?,
            generated_at: Utc::now(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = fingerprint(&json!({"high_count": 1})).unwrap();
        let b = fingerprint(&json!({"high_count": 1})).unwrap();
        let c = fingerprint(&json!({"high_count": 2})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
