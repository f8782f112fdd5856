use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a single voucher.
///
/// Every state may move to every other state; the engine only guards
/// ownership, never transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EsimStatus {
    /// In stock, available to ship.
    #[default]
    Unused,
    /// Handed to an end customer.
    Customer,
    /// Handed to a peer reseller.
    Peer,
    /// Written off.
    Void,
}

impl EsimStatus {
    pub const ALL: [EsimStatus; 4] = [Self::Unused, Self::Customer, Self::Peer, Self::Void];

    /// States that count as shipped and age out of history.
    pub const SHIPPED: [EsimStatus; 3] = [Self::Customer, Self::Peer, Self::Void];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "UNUSED",
            Self::Customer => "CUSTOMER",
            Self::Peer => "PEER",
            Self::Void => "VOID",
        }
    }

    #[inline]
    pub fn is_in_stock(&self) -> bool {
        matches!(self, Self::Unused)
    }
}

impl fmt::Display for EsimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown eSIM status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for EsimStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UNUSED" => Ok(Self::Unused),
            "CUSTOMER" => Ok(Self::Customer),
            "PEER" => Ok(Self::Peer),
            "VOID" => Ok(Self::Void),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }
}

/// Tenant account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub slug: String,
    pub password_hash: String,
}

/// Descriptive and commercial fields of a voucher.
///
/// This is the only part of a record that travels between tenants on import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EsimDetails {
    pub country: Option<String>,
    pub plan_name: Option<String>,
    pub days: Option<i64>,
    pub batch_name: Option<String>,
    pub cost_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub notes: Option<String>,
    pub qr_path: Option<String>,
}

impl EsimDetails {
    pub fn with_qr_path(mut self, qr_path: Option<String>) -> Self {
        self.qr_path = qr_path;
        self
    }
}

/// Input to the single creation primitive. Status is always UNUSED on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEsim {
    pub store_id: Option<i64>,
    pub details: EsimDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EsimRecord {
    pub id: i64,
    pub store_id: Option<i64>,
    pub country: Option<String>,
    pub plan_name: Option<String>,
    pub days: Option<i64>,
    pub batch_name: Option<String>,
    pub cost_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub status: EsimStatus,
    pub customer_name: Option<String>,
    pub customer_contact: Option<String>,
    pub notes: Option<String>,
    pub qr_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EsimRecord {
    pub fn details(&self) -> EsimDetails {
        EsimDetails {
            country: self.country.clone(),
            plan_name: self.plan_name.clone(),
            days: self.days,
            batch_name: self.batch_name.clone(),
            cost_price: self.cost_price,
            sell_price: self.sell_price,
            notes: self.notes.clone(),
            qr_path: self.qr_path.clone(),
        }
    }

    /// Whether `scope` may see and mutate this record.
    pub fn is_visible_to(&self, scope: TenantScope) -> bool {
        match self.store_id {
            Some(owner) => owner == scope.store_id(),
            None => scope.includes_unowned(),
        }
    }
}

/// Full replacement of the mutable attribution fields of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EsimUpdate {
    pub id: i64,
    pub status: EsimStatus,
    pub customer_name: Option<String>,
    pub customer_contact: Option<String>,
    pub notes: Option<String>,
}

/// Ownership filter applied to every tenant-scoped read and write.
///
/// Rows without an owner are legacy data; only the default tenant sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    store_id: i64,
    includes_unowned: bool,
}

impl TenantScope {
    pub fn new(store_id: i64, default_store_id: i64) -> Self {
        Self {
            store_id,
            includes_unowned: store_id == default_store_id,
        }
    }

    /// Scope that never matches legacy unowned rows.
    pub fn owned_only(store_id: i64) -> Self {
        Self {
            store_id,
            includes_unowned: false,
        }
    }

    #[inline]
    pub fn store_id(&self) -> i64 {
        self.store_id
    }

    #[inline]
    pub fn includes_unowned(&self) -> bool {
        self.includes_unowned
    }
}

/// Trims form input; blank strings become `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("customer".parse::<EsimStatus>(), Ok(EsimStatus::Customer));
        assert_eq!(" VOID ".parse::<EsimStatus>(), Ok(EsimStatus::Void));
        assert!("SOLD".parse::<EsimStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_upper_case() {
        let json = serde_json::to_string(&EsimStatus::Peer).unwrap();
        assert_eq!(json, "\"PEER\"");
        for status in EsimStatus::ALL {
            assert_eq!(status.as_str().parse::<EsimStatus>(), Ok(status));
        }
    }

    #[test]
    fn blank_input_becomes_none() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" Ann ".into())), Some("Ann".into()));
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn default_tenant_scope_sees_unowned_rows() {
        let default_scope = TenantScope::new(1, 1);
        let other_scope = TenantScope::new(2, 1);
        assert!(default_scope.includes_unowned());
        assert!(!other_scope.includes_unowned());
        assert!(!TenantScope::owned_only(1).includes_unowned());
    }
}
