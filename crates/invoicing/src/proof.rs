use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use umrahops_core::{DomainError, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofId(Uuid);

impl ProofId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ProofId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProofId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ProofId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s.trim())
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("ProofId: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Dp,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Pending,
    Verified,
    Rejected,
}

/// Where the transfer was made. Saudi-side payments are recorded
/// administratively and carry no uploaded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentLocation {
    #[default]
    Indonesia,
    Saudi,
}

/// Evidence of a transfer. The amount never changes; only the verification
/// fields do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub id: ProofId,
    pub payment_type: PaymentType,
    pub amount: u64,
    pub location: PaymentLocation,
    pub proof_file_url: Option<String>,
    pub status: ProofStatus,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
