//! Site catalog: the per-site probing rules.
//!
//! A catalog is a JSON object mapping a site name to its definition, in the
//! same shape as the widely shared `data.json` username catalogs:
//!
//! ```json
//! {
//!   "GitHub": {
//!     "url": "https://github.com/{}",
//!     "urlMain": "https://github.com/",
//!     "errorType": "status_code",
//!     "regexCheck": "^[a-zA-Z0-9-]{1,39}$"
//!   }
//! }
//! ```
//!
//! A top-level `$schema` key is ignored. Unknown per-site keys are ignored.

use crate::error::HandleCheckError;
use crate::types::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A catalog field that may hold a single value or a list of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.as_slice().contains(value)
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// How to probe one site and interpret its response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Profile URL template; `{}` is replaced by the username
    pub url: String,

    /// URL actually fetched, when it differs from the profile URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_probe: Option<String>,

    /// Home page of the site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_main: Option<String>,

    /// Classification strategies declared for this site
    #[serde(default)]
    pub error_type: OneOrMany<Strategy>,

    /// Body fragments shown when the account does not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<OneOrMany<String>>,

    /// Status codes returned when the account does not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<OneOrMany<u16>>,

    /// Fragment of the URL the site redirects to when the account does not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_url: Option<String>,

    /// Pattern a username must match to be valid on this site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_check: Option<String>,

    /// Extra request headers; values may contain `{}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ServiceDefinition {
    /// Minimal definition with a URL template and a single strategy.
    pub fn new<U: Into<String>>(url: U, strategy: Strategy) -> Self {
        Self {
            url: url.into(),
            error_type: OneOrMany::One(strategy),
            ..Default::default()
        }
    }

    pub fn with_error_msg<M: Into<String>>(mut self, message: M) -> Self {
        self.error_msg = Some(OneOrMany::One(message.into()));
        self
    }

    pub fn with_error_codes(mut self, codes: Vec<u16>) -> Self {
        self.error_code = Some(OneOrMany::Many(codes));
        self
    }

    pub fn with_error_url<S: Into<String>>(mut self, fragment: S) -> Self {
        self.error_url = Some(fragment.into());
        self
    }

    pub fn with_regex_check<S: Into<String>>(mut self, pattern: S) -> Self {
        self.regex_check = Some(pattern.into());
        self
    }

    pub fn with_url_probe<S: Into<String>>(mut self, template: S) -> Self {
        self.url_probe = Some(template.into());
        self
    }

    pub fn with_url_main<S: Into<String>>(mut self, url: S) -> Self {
        self.url_main = Some(url.into());
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers
            .get_or_insert_with(serde_json::Map::new)
            .insert(name.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Strategies declared for this site, in declaration order.
    pub fn strategies(&self) -> &[Strategy] {
        self.error_type.as_slice()
    }

    pub fn declares(&self, strategy: &Strategy) -> bool {
        self.error_type.contains(strategy)
    }
}

/// The set of sites probed in one batch, keyed by unique site name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteCatalog {
    sites: BTreeMap<String, ServiceDefinition>,
}

impl SiteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `HandleCheckError::Catalog` when the document is not a JSON
    /// object or when a site entry cannot be parsed. The error names the site.
    pub fn from_json_str(json: &str) -> Result<Self, HandleCheckError> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(mut entries) = document else {
            return Err(HandleCheckError::catalog(
                "Catalog must be a JSON object keyed by site name",
            ));
        };
        entries.remove("$schema");

        let mut sites = BTreeMap::new();
        for (name, entry) in entries {
            let definition: ServiceDefinition = serde_json::from_value(entry).map_err(|e| {
                HandleCheckError::catalog(format!("Invalid entry for site '{}': {}", name, e))
            })?;
            if definition.url.trim().is_empty() {
                return Err(HandleCheckError::catalog(format!(
                    "Site '{}' has an empty url template",
                    name
                )));
            }
            sites.insert(name, definition);
        }

        debug!(sites = sites.len(), "parsed site catalog");
        Ok(Self { sites })
    }

    /// Read and parse a catalog file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HandleCheckError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HandleCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read site catalog: {}", e),
            )
        })?;
        Self::from_json_str(&content)
    }

    pub fn insert<N: Into<String>>(&mut self, name: N, definition: ServiceDefinition) {
        self.sites.insert(name.into(), definition);
    }

    /// Builder-style `insert`.
    pub fn with_site<N: Into<String>>(mut self, name: N, definition: ServiceDefinition) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.sites.get(name)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceDefinition)> {
        self.sites.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.sites.keys()
    }

    /// Drop every site named in `excluded`. Returns how many were removed.
    pub fn exclude<S: AsRef<str>>(&mut self, excluded: &[S]) -> usize {
        let before = self.sites.len();
        for name in excluded {
            self.sites.remove(name.as_ref());
        }
        before - self.sites.len()
    }

    /// Keep only the named sites (matched case-insensitively).
    pub fn retain_sites<S: AsRef<str>>(&mut self, wanted: &[S]) {
        self.sites.retain(|name, _| {
            wanted
                .iter()
                .any(|w| w.as_ref().trim().eq_ignore_ascii_case(name))
        });
    }
}

impl FromIterator<(String, ServiceDefinition)> for SiteCatalog {
    fn from_iter<I: IntoIterator<Item = (String, ServiceDefinition)>>(iter: I) -> Self {
        Self {
            sites: iter.into_iter().collect(),
        }
    }
}

/// Parse an exclusion list: one site name per line.
///
/// Blank lines and `#` comments are ignored.
pub fn parse_exclusions(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read an exclusion list file (e.g. known false positives).
pub fn load_exclusions<P: AsRef<Path>>(path: P) -> Result<Vec<String>, HandleCheckError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        HandleCheckError::file_error(
            path.to_string_lossy(),
            format!("Failed to read exclusion list: {}", e),
        )
    })?;
    Ok(parse_exclusions(&content))
}
