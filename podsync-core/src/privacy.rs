use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyLevel {
    Public,
    Anonymous,
    Private,
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyLevel::Public => write!(f, "public"),
            PrivacyLevel::Anonymous => write!(f, "anonymous"),
            PrivacyLevel::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(PrivacyLevel::Public),
            "anonymous" => Ok(PrivacyLevel::Anonymous),
            "private" => Ok(PrivacyLevel::Private),
            _ => Err(crate::error::DomainError::InvalidPrivacyLevel),
        }
    }
}

/// The scope a `ChangePrivacy` command targets. Precedence at read time is
/// item > feed > global (spec §3 invariant 5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyScope {
    Global,
    Feed(crate::ids::FeedId),
    Item(crate::ids::ItemId),
}
