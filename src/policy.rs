use crate::fqn::{AttributeFqn, FqnError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error with structured information
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorType {
    Required,
    InvalidFormat,
    FqnParseError,
    InvalidUuid,
    Duplicate,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Invalid attribute: {fqn} - {reason}")]
    InvalidAttribute { fqn: String, reason: String },

    #[error("Policy validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("FQN parse error: {0}")]
    FqnError(#[from] FqnError),
}

impl PolicyError {
    /// Returns a suggestion for how to fix this error, if available
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            PolicyError::MissingField { field: "uuid" } => {
                Some("Use PolicyBuilder::id_auto() to generate a policy UUID")
            }
            PolicyError::MissingField { field: "dissem" } => {
                Some("Add a dissem list to the policy body; an empty list is written as null")
            }
            PolicyError::MissingField { .. } => Some("Build policies with PolicyBuilder"),
            PolicyError::InvalidAttribute { .. } => {
                Some("Use AttributeFqn::parse() to validate FQN format")
            }
            PolicyError::ValidationFailed(errors) if !errors.is_empty() => {
                errors[0].suggestion.as_deref()
            }
            PolicyError::FqnError(e) => Some(e.hint()),
            _ => None,
        }
    }

    /// Returns a stable error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PolicyError::MissingField { .. } => "OPENTDF_E_POLICY_FIELD_MISSING",
            PolicyError::InvalidAttribute { .. } => "OPENTDF_E_POLICY_ATTRIBUTE_INVALID",
            PolicyError::ValidationFailed(_) => "OPENTDF_E_POLICY_VALIDATION",
            PolicyError::SerializationError(_) => "OPENTDF_E_POLICY_SERIALIZATION",
            PolicyError::FqnError(_) => "OPENTDF_E_FQN",
        }
    }
}

/// One data attribute of a policy, in the platform layout
///
/// Every field is always written, so the canonical JSON matches what other
/// OpenTDF clients bind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeObject {
    pub attribute: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "isDefault", default)]
    pub is_default: bool,
    #[serde(rename = "pubKey", default)]
    pub pub_key: String,
    #[serde(rename = "kasURL", default)]
    pub kas_url: String,
}

impl AttributeObject {
    pub fn new(fqn: impl Into<String>) -> Self {
        Self {
            attribute: fqn.into(),
            ..Default::default()
        }
    }
}

/// Attribute-based access policy bound into every key access object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub uuid: String,
    pub body: PolicyBody,
}

/// Policy body containing data attributes and dissemination list
///
/// Empty lists serialize as `null`, not `[]`; policy bindings computed by other
/// OpenTDF clients depend on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyBody {
    #[serde(
        rename = "dataAttributes",
        default,
        serialize_with = "serialize_empty_vec_as_null",
        deserialize_with = "deserialize_null_as_empty_vec"
    )]
    pub data_attributes: Vec<AttributeObject>,
    #[serde(
        serialize_with = "serialize_empty_vec_as_null",
        deserialize_with = "deserialize_null_as_empty_vec"
    )]
    pub dissem: Vec<String>,
}

/// Serialize empty Vec as null so bindings match other OpenTDF clients
fn serialize_empty_vec_as_null<T, S>(vec: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: serde::Serialize,
    S: serde::Serializer,
{
    if vec.is_empty() {
        serializer.serialize_none()
    } else {
        vec.serialize(serializer)
    }
}

/// Deserialize null as empty Vec as other OpenTDF clients write it
fn deserialize_null_as_empty_vec<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

impl Policy {
    pub fn new(uuid: String, data_attributes: Vec<AttributeObject>, dissem: Vec<String>) -> Self {
        Self {
            uuid,
            body: PolicyBody {
                data_attributes,
                dissem,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, PolicyError> {
        serde_json::to_string(self).map_err(PolicyError::from)
    }

    /// Parse a policy, naming the first missing required field
    ///
    /// `uuid`, `body` and `body.dissem` must be present; `dissem` may be `null`.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("uuid").is_none() {
            return Err(PolicyError::MissingField { field: "uuid" });
        }
        let body = value
            .get("body")
            .ok_or(PolicyError::MissingField { field: "body" })?;
        if body.get("dissem").is_none() {
            return Err(PolicyError::MissingField { field: "dissem" });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Attribute value FQNs in policy order
    pub fn attribute_fqns(&self) -> impl Iterator<Item = &str> {
        self.body
            .data_attributes
            .iter()
            .map(|a| a.attribute.as_str())
    }

    /// Validate the policy structure and return all errors found
    ///
    /// # Example
    ///
    /// ```rust
    /// use opentdf_split::prelude::*;
    ///
    /// let policy = PolicyBuilder::new()
    ///     .id_auto()
    ///     .attribute_fqn("https://example.com/attr/clearance/value/secret")?
    ///     .dissem("user@example.com")
    ///     .build()?;
    ///
    /// policy.validate()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut errors = Vec::new();

        if self.uuid.is_empty() {
            errors.push(ValidationError {
                field: "uuid".to_string(),
                error_type: ValidationErrorType::Required,
                message: "Policy UUID is empty".to_string(),
                suggestion: Some("Use PolicyBuilder::id_auto() to generate a valid UUID".to_string()),
            });
        } else if let Err(e) = uuid::Uuid::parse_str(&self.uuid) {
            errors.push(ValidationError {
                field: "uuid".to_string(),
                error_type: ValidationErrorType::InvalidUuid,
                message: format!("Invalid UUID format: {}", e),
                suggestion: Some("Use PolicyBuilder::id_auto() to generate a valid UUID".to_string()),
            });
        }

        let mut seen = HashSet::new();
        for (idx, attr) in self.body.data_attributes.iter().enumerate() {
            match AttributeFqn::parse(&attr.attribute) {
                Ok(fqn) if !fqn.is_value() => errors.push(ValidationError {
                    field: format!("dataAttributes[{}]", idx),
                    error_type: ValidationErrorType::InvalidFormat,
                    message: format!("'{}' is not an attribute value FQN", attr.attribute),
                    suggestion: Some("Reference a value: https://<ns>/attr/<name>/value/<value>".to_string()),
                }),
                Ok(fqn) => {
                    if !seen.insert(fqn) {
                        errors.push(ValidationError {
                            field: format!("dataAttributes[{}]", idx),
                            error_type: ValidationErrorType::Duplicate,
                            message: format!("Duplicate data attribute: {}", attr.attribute),
                            suggestion: Some("Remove duplicate attribute values".to_string()),
                        });
                    }
                }
                Err(e) => errors.push(ValidationError {
                    field: format!("dataAttributes[{}]", idx),
                    error_type: ValidationErrorType::FqnParseError,
                    message: e.to_string(),
                    suggestion: Some(e.hint().to_string()),
                }),
            }
        }

        let mut seen = HashSet::new();
        for (idx, entity) in self.body.dissem.iter().enumerate() {
            if entity.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("dissem[{}]", idx),
                    error_type: ValidationErrorType::InvalidFormat,
                    message: "Empty dissemination entity".to_string(),
                    suggestion: Some("Remove empty entries from dissemination list".to_string()),
                });
            } else if !seen.insert(entity) {
                errors.push(ValidationError {
                    field: format!("dissem[{}]", idx),
                    error_type: ValidationErrorType::Duplicate,
                    message: format!("Duplicate dissemination entity: {}", entity),
                    suggestion: Some("Remove duplicate entries from dissemination list".to_string()),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::ValidationFailed(errors))
        }
    }
}

/// The policy serialized exactly once
///
/// Policy bindings are computed over `base64` and the manifest embeds the same
/// string, so both always refer to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPolicy {
    json: String,
    base64: String,
}

impl CanonicalPolicy {
    pub fn from_policy(policy: &Policy) -> Result<Self, PolicyError> {
        let json = policy.to_json()?;
        let base64 = BASE64.encode(&json);
        Ok(Self { json, base64 })
    }

    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }
}

/// Builder for creating Policy instances with ergonomic defaults
///
/// # Example
///
/// ```
/// use opentdf_split::prelude::*;
///
/// let policy = PolicyBuilder::new()
///     .id_auto()
///     .attribute_fqn("https://example.com/attr/classification/value/secret")?
///     .dissem("user@example.com")
///     .build()?;
/// assert_eq!(policy.body.data_attributes.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    uuid: Option<String>,
    data_attributes: Vec<AttributeObject>,
    dissem: Vec<String>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Auto-generate a UUID v4 for the policy
    #[must_use]
    pub fn id_auto(mut self) -> Self {
        self.uuid = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: AttributeObject) -> Self {
        self.data_attributes.push(attribute);
        self
    }

    /// Add a data attribute from a value FQN, normalized to its canonical URL
    pub fn attribute_fqn(mut self, fqn: impl AsRef<str>) -> Result<Self, PolicyError> {
        let parsed = AttributeFqn::parse(fqn.as_ref())?;
        if !parsed.is_value() {
            return Err(PolicyError::InvalidAttribute {
                fqn: fqn.as_ref().to_string(),
                reason: "expected an attribute value FQN".to_string(),
            });
        }
        self.data_attributes
            .push(AttributeObject::new(parsed.to_url()));
        Ok(self)
    }

    /// Add a dissemination target (entity authorized to access)
    #[must_use]
    pub fn dissem(mut self, target: impl Into<String>) -> Self {
        self.dissem.push(target.into());
        self
    }

    #[must_use]
    pub fn dissemination(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dissem.extend(targets.into_iter().map(|t| t.into()));
        self
    }

    /// Build the Policy
    ///
    /// If no UUID was set, one will be auto-generated.
    pub fn build(self) -> Result<Policy, PolicyError> {
        let uuid = self.uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(Policy::new(uuid, self.data_attributes, self.dissem))
    }
}
