//! Sanitization policy: denylist tables, limits and their JSON configuration.
//!
//! A [`Policy`] is built once and shared read-only. Every name lookup is a
//! set membership test on ASCII-lowercased names: the qualified form first
//! (`{ns}local` or `prefix:local`), then the bare local name.

use crate::error::ConfigError;
use crate::threat::style::is_dangerous_style;
use crate::threat::uri::UriMatcher;
use crate::tree::{Attribute, Name};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// 5 MiB.
pub const DEFAULT_MAX_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_DEPTH: usize = 256;

const FORBIDDEN_TAGS: &[&str] = &[
    "script",
    "foreignObject",
    "iframe",
    "object",
    "embed",
    "applet",
    "meta",
    "link",
];

const URI_ATTRIBUTES: &[&str] = &["href", "xlink:href", "src", "action", "formaction"];

const DANGEROUS_SCHEMES: &[&str] = &["javascript", "vbscript", "data"];

static EVENT_ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^on[a-z]+").expect("event attribute regex is valid"));

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*$").expect("scheme regex is valid"));

/// Built-in policy a configuration starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyBase {
    #[default]
    Svg,
    Xml,
}

/// Why an attribute is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeThreat {
    EventHandler,
    DangerousUri,
    DangerousStyle,
}

/// Immutable sanitization policy.
#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    base: PolicyBase,
    forbidden_tags: BTreeSet<String>,
    uri_attributes: BTreeSet<String>,
    dangerous_schemes: Vec<String>,
    root_tags: BTreeSet<String>,
    max_size: usize,
    max_depth: usize,
    strip_dangerous_style: bool,
    #[serde(skip)]
    uri_matcher: UriMatcher,
}

impl Policy {
    /// Hardened SVG policy: `svg` root required.
    pub fn svg() -> Self {
        Self::base(PolicyBase::Svg)
    }

    /// Generic XML policy: same denylists, any root element.
    pub fn xml() -> Self {
        Self::base(PolicyBase::Xml)
    }

    fn base(base: PolicyBase) -> Self {
        let mut forbidden_tags = BTreeSet::new();
        for tag in FORBIDDEN_TAGS {
            forbidden_tags.insert(tag.to_ascii_lowercase());
            forbidden_tags.insert(format!("{{{SVG_NAMESPACE}}}{tag}").to_ascii_lowercase());
        }
        let root_tags = match base {
            PolicyBase::Svg => ["svg".to_string(), format!("{{{SVG_NAMESPACE}}}svg")]
                .into_iter()
                .collect(),
            PolicyBase::Xml => BTreeSet::new(),
        };
        let dangerous_schemes: Vec<String> =
            DANGEROUS_SCHEMES.iter().map(|s| s.to_string()).collect();
        let uri_matcher =
            UriMatcher::new(dangerous_schemes.as_slice()).expect("built-in schemes are valid");

        Self {
            base,
            forbidden_tags,
            uri_attributes: URI_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            dangerous_schemes,
            root_tags,
            max_size: DEFAULT_MAX_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            strip_dangerous_style: true,
            uri_matcher,
        }
    }

    /// Build a policy from a configuration, validating every override.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, ConfigError> {
        let mut policy = Self::base(config.base);

        if let Some(max_size) = config.max_size {
            if max_size == 0 {
                return Err(ConfigError::Invalid("max_size must be non-zero".into()));
            }
            policy.max_size = max_size;
        }
        if let Some(max_depth) = config.max_depth {
            if max_depth == 0 {
                return Err(ConfigError::Invalid("max_depth must be non-zero".into()));
            }
            policy.max_depth = max_depth;
        }
        if let Some(strip) = config.strip_dangerous_style {
            policy.strip_dangerous_style = strip;
        }
        if let Some(roots) = &config.root_tags {
            policy.root_tags = roots.iter().map(|t| t.trim().to_ascii_lowercase()).collect();
        }

        for tag in &config.extra_forbidden_tags {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(ConfigError::Invalid("empty forbidden tag".into()));
            }
            policy.forbidden_tags.insert(tag.to_ascii_lowercase());
        }
        for attr in &config.extra_uri_attributes {
            let attr = attr.trim();
            if attr.is_empty() {
                return Err(ConfigError::Invalid("empty URI attribute name".into()));
            }
            policy.uri_attributes.insert(attr.to_ascii_lowercase());
        }
        for scheme in &config.extra_dangerous_schemes {
            let scheme = scheme.trim().trim_end_matches(':').to_ascii_lowercase();
            if !SCHEME_RE.is_match(&scheme) {
                return Err(ConfigError::Invalid(format!("invalid URI scheme `{scheme}`")));
            }
            if !policy.dangerous_schemes.contains(&scheme) {
                policy.dangerous_schemes.push(scheme);
            }
        }
        policy.uri_matcher = UriMatcher::new(policy.dangerous_schemes.as_slice())
            .map_err(|e| ConfigError::Invalid(format!("scheme pattern: {e}")))?;

        Ok(policy)
    }

    pub fn kind(&self) -> PolicyBase {
        self.base
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn strips_dangerous_style(&self) -> bool {
        self.strip_dangerous_style
    }

    /// True when the element must be removed along with its subtree.
    pub fn is_forbidden_element(&self, name: &Name) -> bool {
        matches_name(&self.forbidden_tags, name)
    }

    /// True when the root element is acceptable for this policy.
    pub fn accepts_root(&self, name: &Name) -> bool {
        self.root_tags.is_empty() || matches_name(&self.root_tags, name)
    }

    /// `on*` event handler attribute, matched on the local name.
    pub fn is_event_attribute(&self, name: &Name) -> bool {
        EVENT_ATTRIBUTE_RE.is_match(&name.local)
    }

    pub fn is_uri_attribute(&self, name: &Name) -> bool {
        self.uri_attributes.contains(&name.qualified.to_ascii_lowercase())
            || self.uri_attributes.contains(&name.local.to_ascii_lowercase())
    }

    pub fn is_dangerous_uri(&self, value: &str) -> bool {
        self.uri_matcher.is_dangerous(value)
    }

    /// `<style>` element whose text has to be inspected for CSS vectors.
    pub fn is_style_element(&self, name: &Name) -> bool {
        self.strip_dangerous_style && name.local.eq_ignore_ascii_case("style")
    }

    /// Classify an attribute; `None` means it survives.
    pub fn attribute_threat(&self, attr: &Attribute) -> Option<AttributeThreat> {
        if self.is_event_attribute(&attr.name) {
            return Some(AttributeThreat::EventHandler);
        }
        if self.is_uri_attribute(&attr.name) && self.is_dangerous_uri(&attr.value) {
            return Some(AttributeThreat::DangerousUri);
        }
        if self.strip_dangerous_style
            && attr.name.local.eq_ignore_ascii_case("style")
            && is_dangerous_style(&attr.value)
        {
            return Some(AttributeThreat::DangerousStyle);
        }
        None
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::svg()
    }
}

fn matches_name(set: &BTreeSet<String>, name: &Name) -> bool {
    set.contains(&name.expanded().to_ascii_lowercase())
        || set.contains(&name.qualified.to_ascii_lowercase())
        || set.contains(&name.local.to_ascii_lowercase())
}

/// JSON policy configuration layered over a built-in base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub base: PolicyBase,
    pub max_size: Option<usize>,
    pub max_depth: Option<usize>,
    pub root_tags: Option<Vec<String>>,
    pub strip_dangerous_style: Option<bool>,
    pub extra_forbidden_tags: Vec<String>,
    pub extra_uri_attributes: Vec<String>,
    pub extra_dangerous_schemes: Vec<String>,
}

impl PolicyConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON policy file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
