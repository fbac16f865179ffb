//! Search log entry model.

use crate::model::principal::PrincipalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type SearchLogId = Uuid;

/// Query parameters as recorded; ordered for stable serialization.
pub type SearchParameters = BTreeMap<String, String>;

/// Category of an address lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    ById,
    ByCode,
    /// Carrier-assigned site code.
    ByOperator,
    ByHolder,
    ByMunicipality,
    ByDistrict,
    ByStreet,
    ByPostalCode,
    ByCoordinates,
    Listing,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ById => "by_id",
            Self::ByCode => "by_code",
            Self::ByOperator => "by_operator",
            Self::ByHolder => "by_holder",
            Self::ByMunicipality => "by_municipality",
            Self::ByDistrict => "by_district",
            Self::ByStreet => "by_street",
            Self::ByPostalCode => "by_postal_code",
            Self::ByCoordinates => "by_coordinates",
            Self::Listing => "listing",
        }
    }
}

pub fn parse_query_kind(value: &str) -> Option<QueryKind> {
    match value {
        "by_id" => Some(QueryKind::ById),
        "by_code" => Some(QueryKind::ByCode),
        "by_operator" => Some(QueryKind::ByOperator),
        "by_holder" => Some(QueryKind::ByHolder),
        "by_municipality" => Some(QueryKind::ByMunicipality),
        "by_district" => Some(QueryKind::ByDistrict),
        "by_street" => Some(QueryKind::ByStreet),
        "by_postal_code" => Some(QueryKind::ByPostalCode),
        "by_coordinates" => Some(QueryKind::ByCoordinates),
        "listing" => Some(QueryKind::Listing),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub id: SearchLogId,
    pub actor_id: PrincipalId,
    pub query_kind: QueryKind,
    pub parameters: SearchParameters,
    pub logged_at: i64,
}

impl SearchLogEntry {
    pub fn new(
        actor_id: PrincipalId,
        query_kind: QueryKind,
        parameters: SearchParameters,
        logged_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            query_kind,
            parameters,
            logged_at,
        }
    }
}
