//! Fully Qualified Name (FQN) support for OpenTDF attributes
//!
//! FQNs are the stable keys of the attribute graph:
//!
//! - Namespace: `https://<namespace>`
//! - Attribute: `https://<namespace>/attr/<name>`
//! - Value: `https://<namespace>/attr/<name>/value/<value>`
//!
//! # Example
//!
//! ```
//! use opentdf_split::fqn::AttributeFqn;
//!
//! let fqn = AttributeFqn::parse("https://example.com/attr/classification/value/secret")?;
//! assert_eq!(fqn.namespace(), "example.com");
//! assert_eq!(fqn.name(), Some("classification"));
//! assert_eq!(fqn.value(), Some("secret"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// FQN parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FqnError {
    #[error("URL must use HTTPS scheme: {url}")]
    NotHttps { url: String },

    #[error("FQN missing required /attr/ structure: {url}")]
    MissingAttrStructure { url: String },

    #[error("Malformed FQN: {0}")]
    MalformedUrl(String),

    #[error("Missing required component: {component}")]
    MissingComponent { component: &'static str },
}

impl FqnError {
    /// Returns a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FqnError::NotHttps { .. } => "OPENTDF_E_FQN_NOT_HTTPS",
            FqnError::MissingAttrStructure { .. } => "OPENTDF_E_FQN_STRUCTURE",
            FqnError::MalformedUrl(_) => "OPENTDF_E_FQN_MALFORMED",
            FqnError::MissingComponent { .. } => "OPENTDF_E_FQN_COMPONENT_MISSING",
        }
    }

    /// Returns a hint for how to fix this error
    pub fn hint(&self) -> &'static str {
        match self {
            FqnError::NotHttps { .. } => {
                "FQNs must use HTTPS. Example: https://example.com/attr/name/value/val"
            }
            FqnError::MissingAttrStructure { .. } => {
                "FQN must follow format: https://<namespace>/attr/<name>/value/<value>"
            }
            FqnError::MalformedUrl(_) => "Ensure the FQN is formatted as https://host/path",
            FqnError::MissingComponent { component } => match *component {
                "namespace" => "Provide a namespace: https://namespace.com/...",
                "name" => "Provide an attribute name: .../attr/name/...",
                _ => "Ensure all required FQN components are present",
            },
        }
    }
}

/// Fully Qualified Name of a namespace, an attribute, or an attribute value
///
/// Namespaces compare case-insensitively (they are stored lowercased); names and
/// values are kept as given after percent-decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeFqn {
    namespace: String,
    name: Option<String>,
    value: Option<String>,
}

impl AttributeFqn {
    /// Parse an FQN string
    ///
    /// Accepts all three levels. `http://` is rejected, as is any path that does not
    /// start with `attr/`.
    pub fn parse(s: &str) -> Result<Self, FqnError> {
        let rest = match s.split_once("://") {
            Some(("https", rest)) => rest,
            Some(("http", _)) => return Err(FqnError::NotHttps { url: s.to_string() }),
            Some((scheme, _)) => {
                return Err(FqnError::MalformedUrl(format!(
                    "unsupported scheme '{}' in {}",
                    scheme, s
                )))
            }
            None => {
                return Err(FqnError::MalformedUrl(
                    "Missing scheme separator ://".to_string(),
                ))
            }
        };

        let (namespace, path) = match rest.split_once('/') {
            Some((ns, path)) => (ns, Some(path)),
            None => (rest, None),
        };
        if namespace.is_empty() {
            return Err(FqnError::MissingComponent {
                component: "namespace",
            });
        }
        let namespace = namespace.to_lowercase();

        let path = match path {
            None | Some("") => {
                return Ok(Self {
                    namespace,
                    name: None,
                    value: None,
                })
            }
            Some(path) => path,
        };

        let path = path
            .strip_prefix("attr/")
            .ok_or_else(|| FqnError::MissingAttrStructure { url: s.to_string() })?;

        let (name, value) = match path.split_once("/value/") {
            Some((name, value)) => (name, Some(value)),
            None => (path, None),
        };
        if name.is_empty() || name.contains('/') {
            return Err(FqnError::MissingComponent { component: "name" });
        }
        if let Some(value) = value {
            if value.is_empty() || value.contains('/') {
                return Err(FqnError::MissingComponent { component: "value" });
            }
        }

        Ok(Self {
            namespace,
            name: Some(percent_decode(name)),
            value: value.map(percent_decode),
        })
    }

    /// Create an FQN for a namespace only
    pub fn namespace_of(ns: &str) -> Self {
        Self {
            namespace: ns.to_lowercase(),
            name: None,
            value: None,
        }
    }

    /// Create an FQN for an attribute (namespace + name)
    pub fn attribute(ns: &str, name: &str) -> Self {
        Self {
            namespace: ns.to_lowercase(),
            name: Some(name.to_string()),
            value: None,
        }
    }

    /// Create an FQN for an attribute value (namespace + name + value)
    pub fn with_value(ns: &str, name: &str, value: &str) -> Self {
        Self {
            namespace: ns.to_lowercase(),
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_namespace(&self) -> bool {
        self.name.is_none()
    }

    pub fn is_value(&self) -> bool {
        self.value.is_some()
    }

    /// The FQN one level up: value → attribute → namespace
    pub fn parent(&self) -> Option<Self> {
        if self.value.is_some() {
            Some(Self {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
                value: None,
            })
        } else if self.name.is_some() {
            Some(Self::namespace_of(&self.namespace))
        } else {
            None
        }
    }

    /// Convert to the canonical HTTPS URL string
    pub fn to_url(&self) -> String {
        match (&self.name, &self.value) {
            (None, _) => format!("https://{}", self.namespace),
            (Some(name), None) => format!("https://{}/attr/{}", self.namespace, percent_encode(name)),
            (Some(name), Some(value)) => format!(
                "https://{}/attr/{}/value/{}",
                self.namespace,
                percent_encode(name),
                percent_encode(value)
            ),
        }
    }
}

impl fmt::Display for AttributeFqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

impl FromStr for AttributeFqn {
    type Err = FqnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'a> TryFrom<&'a str> for AttributeFqn {
    type Error = FqnError;

    fn try_from(s: &'a str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

/// Percent-encode everything outside the URL unreserved set
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Percent-decode a path segment; malformed escapes are kept verbatim
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_fqn() {
        let fqn =
            AttributeFqn::parse("https://example.com/attr/classification/value/secret").unwrap();
        assert_eq!(fqn.namespace(), "example.com");
        assert_eq!(fqn.name(), Some("classification"));
        assert_eq!(fqn.value(), Some("secret"));
        assert!(fqn.is_value());
    }

    #[test]
    fn test_parse_attribute_and_namespace() {
        let attr = AttributeFqn::parse("https://example.com/attr/classification").unwrap();
        assert_eq!(attr.name(), Some("classification"));
        assert_eq!(attr.value(), None);

        let ns = AttributeFqn::parse("https://example.com").unwrap();
        assert!(ns.is_namespace());
        assert_eq!(ns.to_url(), "https://example.com");
    }

    #[test]
    fn test_reject_http() {
        let result = AttributeFqn::parse("http://example.com/attr/test/value/val");
        assert!(matches!(result, Err(FqnError::NotHttps { .. })));
    }

    #[test]
    fn test_missing_attr_structure() {
        let result = AttributeFqn::parse("https://example.com/test/value");
        assert!(matches!(result, Err(FqnError::MissingAttrStructure { .. })));
    }

    #[test]
    fn test_empty_value_rejected() {
        let result = AttributeFqn::parse("https://example.com/attr/test/value/");
        assert!(matches!(
            result,
            Err(FqnError::MissingComponent { component: "value" })
        ));
    }

    #[test]
    fn test_case_insensitive_namespace() {
        let a = AttributeFqn::parse("https://EXAMPLE.COM/attr/test").unwrap();
        let b = AttributeFqn::parse("https://example.com/attr/test").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_percent_encoding_roundtrip() {
        let fqn = AttributeFqn::with_value("example.com", "test name", "café");
        let url = fqn.to_url();
        assert!(url.contains("test%20name"));
        assert!(url.contains("caf%C3%A9"));
        assert_eq!(AttributeFqn::parse(&url).unwrap(), fqn);
    }

    #[test]
    fn test_parent_chain() {
        let fqn = AttributeFqn::parse("https://example.com/attr/rel/value/usa").unwrap();
        let attr = fqn.parent().unwrap();
        assert_eq!(attr.to_url(), "https://example.com/attr/rel");
        let ns = attr.parent().unwrap();
        assert_eq!(ns.to_url(), "https://example.com");
        assert!(ns.parent().is_none());
    }
}
