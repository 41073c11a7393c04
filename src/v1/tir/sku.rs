//! Billing enums and the `sku_details` block shared by nodes, endpoints and
//! private clusters.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::de::{int_or_string, nullable};

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkuType {
    #[default]
    Hourly,
    Committed,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
pub enum Currency {
    #[default]
    INR,
    USD,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct SkuDetails {
    #[serde(default, deserialize_with = "nullable")]
    pub specs: SkuSpecs,
    #[serde(default, deserialize_with = "nullable")]
    pub plan: SkuPlan,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct SkuSpecs {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct SkuPlan {
    #[serde(default, deserialize_with = "nullable")]
    pub sku_type: Option<SkuType>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub committed_days: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub currency: Option<Currency>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn sku_type_wire_names() {
        assert_eq!(json!(SkuType::Committed), json!("committed"));
        assert_eq!(SkuType::from_str("hourly"), Ok(SkuType::Hourly));
        assert_eq!(Currency::USD.to_string(), "USD");
    }

    #[test]
    fn sku_details_tolerates_nulls() {
        let details: SkuDetails = serde_json::from_value(json!({
            "specs": {"name": "GDC3.A10080-16.115GB"},
            "plan": {"sku_type": "hourly", "committed_days": "0", "currency": null}
        }))
        .unwrap();
        assert_eq!(details.specs.name, "GDC3.A10080-16.115GB");
        assert_eq!(details.plan.sku_type, Some(SkuType::Hourly));
        assert_eq!(details.plan.currency, None);
        let empty: SkuDetails = serde_json::from_value(json!({"specs": null})).unwrap();
        assert_eq!(empty, SkuDetails::default());
    }
}
