//! Address record model and change deltas.
//!
//! # Responsibility
//! - Define the current-state address record owned by storage.
//! - Define `AddressDelta`, the payload shape shared by direct edits,
//!   suggestions and change events.
//!
//! # Invariants
//! - `code` is unique across all records, deleted ones included, and
//!   compares case-insensitively (`rnnt01` and `RNNT01` are the same site).
//! - `version` starts at 1 and grows by exactly 1 per applied mutation.
//! - History is not kept on the record; it is replayed from change events.

use crate::model::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stable numeric identifier of an address record.
pub type AddressId = i64;

const MAX_TEXT_FIELD_CHARS: usize = 200;

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,31}$").expect("valid code regex"));
static UF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid uf regex"));
static POSTAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("valid postal code regex"));

/// Physical installation category of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    Greenfield,
    Rooftop,
    Shopping,
    Indoor,
    /// Cell on wheels.
    Cow,
    Fastsite,
    Outdoor,
    Harmonized,
    RanSharing,
    StreetLevel,
    SmallCell,
}

impl SiteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greenfield => "greenfield",
            Self::Rooftop => "rooftop",
            Self::Shopping => "shopping",
            Self::Indoor => "indoor",
            Self::Cow => "cow",
            Self::Fastsite => "fastsite",
            Self::Outdoor => "outdoor",
            Self::Harmonized => "harmonized",
            Self::RanSharing => "ran_sharing",
            Self::StreetLevel => "street_level",
            Self::SmallCell => "small_cell",
        }
    }
}

/// Parses a site type from its stable string form.
pub fn parse_site_type(value: &str) -> Option<SiteType> {
    match value {
        "greenfield" => Some(SiteType::Greenfield),
        "rooftop" => Some(SiteType::Rooftop),
        "shopping" => Some(SiteType::Shopping),
        "indoor" => Some(SiteType::Indoor),
        "cow" => Some(SiteType::Cow),
        "fastsite" => Some(SiteType::Fastsite),
        "outdoor" => Some(SiteType::Outdoor),
        "harmonized" => Some(SiteType::Harmonized),
        "ran_sharing" => Some(SiteType::RanSharing),
        "street_level" => Some(SiteType::StreetLevel),
        "small_cell" => Some(SiteType::SmallCell),
        _ => None,
    }
}

/// Current state of one address as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: AddressId,
    /// External alphanumeric identifier (for example `rnit08`).
    pub code: String,
    pub uf: String,
    pub municipality: String,
    /// Neighbourhood (`bairro`).
    pub district: String,
    pub street: String,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub site_type: Option<SiteType>,
    /// Owning tower-holder company, when known.
    pub holder_id: Option<i64>,
    pub shared: bool,
    pub version: i64,
    pub is_deleted: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl AddressRecord {
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Full field set required to create an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub code: String,
    pub uf: String,
    pub municipality: String,
    pub district: String,
    pub street: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub site_type: Option<SiteType>,
    #[serde(default)]
    pub holder_id: Option<i64>,
    #[serde(default)]
    pub shared: bool,
}

impl NewAddress {
    /// Creates an address payload with the required location fields only.
    pub fn new(
        code: impl Into<String>,
        uf: impl Into<String>,
        municipality: impl Into<String>,
        district: impl Into<String>,
        street: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            uf: uf.into(),
            municipality: municipality.into(),
            district: district.into(),
            street: street.into(),
            number: None,
            complement: None,
            postal_code: None,
            latitude: None,
            longitude: None,
            site_type: None,
            holder_id: None,
            shared: false,
        }
    }

    /// Validates every field of a creation payload.
    pub fn validate(&self) -> Result<(), ValidationError> {
        AddressDelta::from(self).validate()
    }
}

/// Partial address change. `None` leaves a field untouched.
///
/// The same shape is used as suggestion payload and as change-event delta;
/// an `add` delta carries every required field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AddressDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_type: Option<SiteType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

impl AddressDelta {
    /// Returns whether the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Names of required creation fields absent from this delta.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("code", &self.code),
            ("uf", &self.uf),
            ("municipality", &self.municipality),
            ("district", &self.district),
            ("street", &self.street),
        ] {
            if value.is_none() {
                missing.push(name);
            }
        }
        missing
    }

    /// Converts a full delta into a creation payload.
    pub fn to_new_address(&self) -> Result<NewAddress, ValidationError> {
        let missing = self.missing_required_fields();
        if !missing.is_empty() {
            return Err(ValidationError::IncompletePayload { missing });
        }
        self.validate()?;

        let mut address = NewAddress::new(
            self.code.clone().unwrap_or_default(),
            self.uf.clone().unwrap_or_default(),
            self.municipality.clone().unwrap_or_default(),
            self.district.clone().unwrap_or_default(),
            self.street.clone().unwrap_or_default(),
        );
        address.number = self.number.clone();
        address.complement = self.complement.clone();
        address.postal_code = self.postal_code.clone();
        address.latitude = self.latitude;
        address.longitude = self.longitude;
        address.site_type = self.site_type;
        address.holder_id = self.holder_id;
        address.shared = self.shared.unwrap_or(false);
        Ok(address)
    }

    /// Validates every field present in the delta.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(code) = self.code.as_deref() {
            validate_code("code", code)?;
        }
        if let Some(uf) = self.uf.as_deref() {
            if !UF_RE.is_match(uf) {
                return Err(ValidationError::invalid_field(
                    "uf",
                    "expected two uppercase letters",
                ));
            }
        }
        for (field, value) in [
            ("municipality", &self.municipality),
            ("district", &self.district),
            ("street", &self.street),
        ] {
            if let Some(value) = value.as_deref() {
                validate_text(field, value, true)?;
            }
        }
        for (field, value) in [("number", &self.number), ("complement", &self.complement)] {
            if let Some(value) = value.as_deref() {
                validate_text(field, value, false)?;
            }
        }
        if let Some(postal_code) = self.postal_code.as_deref() {
            if !POSTAL_CODE_RE.is_match(postal_code) {
                return Err(ValidationError::invalid_field(
                    "postal_code",
                    "expected `NNNNN-NNN` or `NNNNNNNN`",
                ));
            }
        }
        if let Some(latitude) = self.latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(ValidationError::invalid_field(
                    "latitude",
                    "must be within [-90, 90]",
                ));
            }
        }
        if let Some(longitude) = self.longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(ValidationError::invalid_field(
                    "longitude",
                    "must be within [-180, 180]",
                ));
            }
        }
        Ok(())
    }

    /// Writes every present field onto `record`.
    ///
    /// Version and timestamps are left to the repository.
    pub fn apply_to(&self, record: &mut AddressRecord) {
        if let Some(value) = &self.code {
            record.code = value.clone();
        }
        if let Some(value) = &self.uf {
            record.uf = value.clone();
        }
        if let Some(value) = &self.municipality {
            record.municipality = value.clone();
        }
        if let Some(value) = &self.district {
            record.district = value.clone();
        }
        if let Some(value) = &self.street {
            record.street = value.clone();
        }
        if let Some(value) = &self.number {
            record.number = Some(value.clone());
        }
        if let Some(value) = &self.complement {
            record.complement = Some(value.clone());
        }
        if let Some(value) = &self.postal_code {
            record.postal_code = Some(value.clone());
        }
        if let Some(value) = self.latitude {
            record.latitude = Some(value);
        }
        if let Some(value) = self.longitude {
            record.longitude = Some(value);
        }
        if let Some(value) = self.site_type {
            record.site_type = Some(value);
        }
        if let Some(value) = self.holder_id {
            record.holder_id = Some(value);
        }
        if let Some(value) = self.shared {
            record.shared = value;
        }
    }
}

impl From<&NewAddress> for AddressDelta {
    fn from(value: &NewAddress) -> Self {
        Self {
            code: Some(value.code.clone()),
            uf: Some(value.uf.clone()),
            municipality: Some(value.municipality.clone()),
            district: Some(value.district.clone()),
            street: Some(value.street.clone()),
            number: value.number.clone(),
            complement: value.complement.clone(),
            postal_code: value.postal_code.clone(),
            latitude: value.latitude,
            longitude: value.longitude,
            site_type: value.site_type,
            holder_id: value.holder_id,
            shared: Some(value.shared),
        }
    }
}

/// Axis-aligned coordinate window, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Rejects out-of-range edges and inverted windows. Windows crossing the
    /// antimeridian are not supported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for latitude in [self.south, self.north] {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(ValidationError::invalid_field(
                    "bounds",
                    "latitudes must be within [-90, 90]",
                ));
            }
        }
        for longitude in [self.west, self.east] {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(ValidationError::invalid_field(
                    "bounds",
                    "longitudes must be within [-180, 180]",
                ));
            }
        }
        if self.south > self.north || self.west > self.east {
            return Err(ValidationError::invalid_field(
                "bounds",
                "south/west must not exceed north/east",
            ));
        }
        Ok(())
    }
}

/// Checks the shape shared by address, holder, operator and site codes.
pub(crate) fn validate_code(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if !CODE_RE.is_match(value) {
        return Err(ValidationError::invalid_field(
            field,
            "expected 1-32 alphanumeric characters, `_`, `.` or `-`",
        ));
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    required: bool,
) -> Result<(), ValidationError> {
    if required && value.trim().is_empty() {
        return Err(ValidationError::invalid_field(field, "must not be blank"));
    }
    if value.chars().count() > MAX_TEXT_FIELD_CHARS {
        return Err(ValidationError::invalid_field(
            field,
            format!("must be at most {MAX_TEXT_FIELD_CHARS} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AddressDelta, GeoBounds, NewAddress};
    use crate::model::validation::ValidationError;

    #[test]
    fn full_delta_converts_to_new_address() {
        let source = NewAddress::new("rnit08", "RN", "Natal", "Centro", "Av. Rio Branco");
        let delta = AddressDelta::from(&source);
        assert_eq!(delta.to_new_address().unwrap(), source);
    }

    #[test]
    fn partial_delta_reports_missing_fields_in_order() {
        let delta = AddressDelta {
            district: Some("Centro".to_string()),
            ..AddressDelta::default()
        };
        let err = delta.to_new_address().unwrap_err();
        assert_eq!(
            err,
            ValidationError::IncompletePayload {
                missing: vec!["code", "uf", "municipality", "street"],
            }
        );
    }

    #[test]
    fn validate_rejects_bad_uf_and_postal_code() {
        let bad_uf = AddressDelta {
            uf: Some("rn".to_string()),
            ..AddressDelta::default()
        };
        assert!(matches!(
            bad_uf.validate(),
            Err(ValidationError::InvalidField { field: "uf", .. })
        ));

        let bad_cep = AddressDelta {
            postal_code: Some("5902".to_string()),
            ..AddressDelta::default()
        };
        assert!(matches!(
            bad_cep.validate(),
            Err(ValidationError::InvalidField {
                field: "postal_code",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_coordinates() {
        let delta = AddressDelta {
            latitude: Some(91.0),
            ..AddressDelta::default()
        };
        assert!(delta.validate().is_err());
    }

    #[test]
    fn empty_delta_is_detected() {
        assert!(AddressDelta::default().is_empty());
        let delta = AddressDelta {
            shared: Some(false),
            ..AddressDelta::default()
        };
        assert!(!delta.is_empty());
    }

    #[test]
    fn delta_rejects_unknown_json_fields() {
        let parsed = serde_json::from_str::<AddressDelta>(r#"{"bairro":"Centro"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn bounds_reject_inverted_and_out_of_range_windows() {
        let natal = GeoBounds {
            south: -6.0,
            west: -35.4,
            north: -5.7,
            east: -35.1,
        };
        assert!(natal.validate().is_ok());

        let inverted = GeoBounds {
            south: -5.7,
            north: -6.0,
            ..natal
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidField { field: "bounds", .. })
        ));

        let off_globe = GeoBounds {
            east: 181.0,
            ..natal
        };
        assert!(off_globe.validate().is_err());
    }
}
