// src/lifecycle.rs
//
// Certificate lifecycle:
//
//   available -> issued -> claimed -> registered -> completed
//                  |          |
//                  +----------+--> expired

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Available,
    Issued,
    Claimed,
    Registered,
    Completed,
    Expired,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Available => "available",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Claimed => "claimed",
            CertificateStatus::Registered => "registered",
            CertificateStatus::Completed => "completed",
            CertificateStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CertificateStatus::Completed | CertificateStatus::Expired)
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateEvent {
    Issue,
    Claim,
    Register,
    Complete,
    Expire,
}

impl fmt::Display for CertificateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertificateEvent::Issue => "issue",
            CertificateEvent::Claim => "claim",
            CertificateEvent::Register => "register",
            CertificateEvent::Complete => "complete",
            CertificateEvent::Expire => "expire",
        };
        f.write_str(s)
    }
}

pub fn transition(from: CertificateStatus, event: CertificateEvent) -> Result<CertificateStatus> {
    use CertificateEvent as E;
    use CertificateStatus as S;

    let to = match (from, event) {
        (S::Available, E::Issue) => S::Issued,
        (S::Issued, E::Claim) => S::Claimed,
        (S::Claimed, E::Register) => S::Registered,
        (S::Registered, E::Complete) => S::Completed,
        (S::Issued, E::Expire) | (S::Claimed, E::Expire) => S::Expired,
        _ => {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(to)
}
