//! MAC vendor lookup lens
//!
//! The query is normalized to an OUI key (separators removed, at most six
//! characters, uppercase). The same key is matched against vendor prefixes
//! (anchored) and company names (substring), so `"00:00:0c:12:34:56"` and
//! `"cisco"` both find Cisco.

use crate::database::{VendorRecord, VendorRepository};
use crate::datasets::normalize_oui;
use crate::error::LookupError;
use crate::lens::utils::{format_rows, OutputFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabled::Tabled;

/// Vendor as presented to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct VendorView {
    pub oui: String,
    pub company_name: String,
}

impl From<&VendorRecord> for VendorView {
    fn from(record: &VendorRecord) -> Self {
        Self {
            oui: record.prefix.clone(),
            company_name: record.company_name.clone(),
        }
    }
}

pub struct VendorLens {
    repository: Arc<dyn VendorRepository>,
}

impl VendorLens {
    pub fn new(repository: Arc<dyn VendorRepository>) -> Self {
        Self { repository }
    }

    /// Look up vendors for a MAC address, OUI or company fragment
    ///
    /// No matches is `LookupError::NotFound`.
    pub fn lookup(&self, token: &str) -> Result<Vec<VendorRecord>, LookupError> {
        let key = normalize_oui(token);
        if key.is_empty() {
            return Err(LookupError::EmptyQuery);
        }
        self.repository.get(&key, &key)
    }

    pub fn count(&self) -> Result<u64, LookupError> {
        Ok(self.repository.count()?)
    }

    pub fn format_results(records: &[VendorRecord], format: OutputFormat) -> String {
        let views: Vec<VendorView> = records.iter().map(VendorView::from).collect();
        format_rows(&views, format)
    }
}
