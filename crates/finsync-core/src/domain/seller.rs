//! Seller identity and credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{SellerId, SellerKey};

/// Composite identity of a seller: the key every Task row is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerRef {
    pub seller_key: SellerKey,
    pub seller_id: SellerId,
}

impl SellerRef {
    pub fn new(seller_key: impl Into<SellerKey>, seller_id: impl Into<SellerId>) -> Self {
        Self {
            seller_key: seller_key.into(),
            seller_id: seller_id.into(),
        }
    }
}

impl fmt::Display for SellerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.seller_key, self.seller_id)
    }
}

/// Opaque secret material. `Debug` never prints the content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretMaterial(String);

impl SecretMaterial {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretMaterial(***)")
    }
}

/// One seller account to ingest. Owned by the external credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerCredential {
    pub seller_key: SellerKey,
    pub seller_id: SellerId,
    pub material: SecretMaterial,
    pub role_arn: String,
}

impl SellerCredential {
    pub fn seller(&self) -> SellerRef {
        SellerRef {
            seller_key: self.seller_key.clone(),
            seller_id: self.seller_id.clone(),
        }
    }

    /// The role to assume: the entry's own, else the deployment default.
    pub fn role<'a>(&'a self, default_role: Option<&'a str>) -> Option<&'a str> {
        let own = self.role_arn.trim();
        if own.is_empty() {
            default_role.map(str::trim).filter(|r| !r.is_empty())
        } else {
            Some(own)
        }
    }

    /// Returns the reason this entry cannot be dispatched, if any.
    pub fn defect(&self, default_role: Option<&str>) -> Option<&'static str> {
        if self.seller_key.is_blank() {
            Some("blank sellerKey")
        } else if self.seller_id.is_blank() {
            Some("blank sellerId")
        } else if self.role(default_role).is_none() {
            Some("missing role reference")
        } else {
            None
        }
    }
}

/// Short-lived credentials returned by role assumption, scoped to one seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedCredentials {
    pub role_arn: String,
    pub session_name: String,
    pub token: SecretMaterial,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(seller_key: &str, seller_id: &str, role_arn: &str) -> SellerCredential {
        SellerCredential {
            seller_key: SellerKey::new(seller_key),
            seller_id: SellerId::new(seller_id),
            material: SecretMaterial::new("refresh-token"),
            role_arn: role_arn.to_string(),
        }
    }

    #[test]
    fn debug_redacts_secret_material() {
        let cred = credential("tenant", "S1", "arn:aws:iam::1:role/spapi");
        let printed = format!("{cred:?}");
        assert!(!printed.contains("refresh-token"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn defect_reports_first_problem() {
        assert_eq!(credential("tenant", "S1", "arn").defect(None), None);
        assert_eq!(credential("", "S1", "arn").defect(None), Some("blank sellerKey"));
        assert_eq!(credential("tenant", " ", "arn").defect(None), Some("blank sellerId"));
        assert_eq!(
            credential("tenant", "S1", "").defect(None),
            Some("missing role reference")
        );
    }

    #[test]
    fn default_role_fills_missing_reference() {
        let cred = credential("tenant", "S1", "");
        assert_eq!(cred.defect(Some("arn:default")), None);
        assert_eq!(cred.role(Some("arn:default")), Some("arn:default"));
        assert_eq!(cred.role(Some("  ")), None);

        let own = credential("tenant", "S1", "arn:own");
        assert_eq!(own.role(Some("arn:default")), Some("arn:own"));
    }

    #[test]
    fn seller_ref_displays_composite_key() {
        assert_eq!(SellerRef::new("tenant", "S1").to_string(), "tenant/S1");
    }
}
