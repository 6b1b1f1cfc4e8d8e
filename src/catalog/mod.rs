//! Application catalog (C7, loader half): declarative descriptor files
//! loaded once at startup, a version-resolution layer with three
//! strategies, and the `{{KEY}}` template substitution used to render Helm
//! values.

pub mod version;

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::XanthusError;

fn namespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").unwrap())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VersionSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HelmChartSpec {
    pub repository: String,
    pub chart: String,
    pub version: String,
    pub namespace: String,
    pub values_template: String,
    #[serde(default)]
    pub placeholders: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Requirements {
    pub min_cpu: u32,
    pub min_memory_gb: f64,
    pub min_disk_gb: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: String,
    pub version_source: VersionSource,
    pub helm_chart: HelmChartSpec,
    pub default_port: u16,
    pub requirements: Requirements,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub documentation: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn repository_shape_is_known(repository: &str) -> bool {
    repository == "local"
        || repository.starts_with("https://")
        || repository.starts_with("git+https://")
}

fn validate(descriptor: &CatalogDescriptor) -> Result<(), String> {
    if descriptor.id.trim().is_empty() {
        return Err("missing id".into());
    }
    if !repository_shape_is_known(&descriptor.helm_chart.repository) {
        return Err(format!(
            "unrecognised repository shape `{}`",
            descriptor.helm_chart.repository
        ));
    }
    if !namespace_pattern().is_match(&descriptor.helm_chart.namespace) {
        return Err(format!(
            "namespace `{}` does not match ^[a-z0-9-]+$",
            descriptor.helm_chart.namespace
        ));
    }
    if !matches!(descriptor.version_source.kind.as_str(), "github" | "helm" | "fixed") {
        return Err(format!(
            "unknown version_source.type `{}`",
            descriptor.version_source.kind
        ));
    }
    Ok(())
}

/// A catalog indexed by descriptor id, built once at startup and held
/// behind an `Arc` in application state. Duplicate ids are first-wins;
/// invalid descriptors are logged and skipped rather than aborting startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    descriptors: HashMap<String, CatalogDescriptor>,
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&CatalogDescriptor> {
        self.descriptors.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &CatalogDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Reads every `*.toml` file directly under `dir`, parses and validates
/// each, and indexes the survivors by id.
pub fn load_dir(dir: &Path) -> Result<Catalog, XanthusError> {
    let mut catalog = Catalog::default();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| XanthusError::BadInput(format!("cannot read catalog dir {}: {e}", dir.display())))?;

    let mut skipped = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let raw = match std::fs::read_to_string(&path) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable catalog descriptor");
                skipped += 1;
                continue;
            }
        };
        let descriptor: CatalogDescriptor = match toml::from_str(&raw) {
            Ok(d) => d,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping malformed catalog descriptor");
                skipped += 1;
                continue;
            }
        };
        if let Err(reason) = validate(&descriptor) {
            warn!(file = %path.display(), reason, "skipping invalid catalog descriptor");
            skipped += 1;
            continue;
        }
        if catalog.descriptors.contains_key(&descriptor.id) {
            warn!(id = %descriptor.id, file = %path.display(), "duplicate descriptor id, keeping the first one loaded");
            skipped += 1;
            continue;
        }
        catalog.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    info!(loaded = catalog.len(), skipped, dir = %dir.display(), "catalog loaded");
    Ok(catalog)
}

/// Substitutes descriptor-declared placeholders, then the three core
/// tokens, then any caller overrides, in that order — later substitutions
/// never re-expand tokens a previous pass already resolved since they all
/// operate on literal strings.
pub fn render_values(
    template: &str,
    placeholders: &HashMap<String, String>,
    version: &str,
    domain: &str,
    subdomain: &str,
    overrides: &HashMap<String, String>,
) -> String {
    let mut rendered = template.to_string();
    for (key, value) in placeholders {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered = rendered.replace("{{.Version}}", version);
    rendered = rendered.replace("{{.Domain}}", domain);
    rendered = rendered.replace("{{.Subdomain}}", subdomain);
    for (key, value) in overrides {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(repo: &str, ns: &str, vtype: &str) -> CatalogDescriptor {
        CatalogDescriptor {
            id: "code-server".into(),
            name: "code-server".into(),
            description: "VS Code in the browser".into(),
            icon: "code".into(),
            category: "dev".into(),
            version_source: VersionSource {
                kind: vtype.into(),
                source: "coder/code-server".into(),
                pattern: Some("v*".into()),
                value: None,
            },
            helm_chart: HelmChartSpec {
                repository: repo.into(),
                chart: "code-server".into(),
                version: "1.0.0".into(),
                namespace: ns.into(),
                values_template: "image.tag={{.Version}}".into(),
                placeholders: HashMap::new(),
            },
            default_port: 8080,
            requirements: Requirements { min_cpu: 1, min_memory_gb: 1.0, min_disk_gb: 5 },
            features: vec![],
            documentation: String::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn accepts_well_formed_descriptor() {
        assert!(validate(&descriptor("https://charts.example.com", "code-server", "github")).is_ok());
        assert!(validate(&descriptor("local", "code-server", "fixed")).is_ok());
        assert!(validate(&descriptor("git+https://example.com/repo", "code-server", "helm")).is_ok());
    }

    #[test]
    fn rejects_unknown_repository_shape() {
        assert!(validate(&descriptor("ftp://example.com", "code-server", "github")).is_err());
    }

    #[test]
    fn rejects_bad_namespace() {
        assert!(validate(&descriptor("local", "Code_Server", "github")).is_err());
    }

    #[test]
    fn rejects_unknown_version_source_type() {
        assert!(validate(&descriptor("local", "code-server", "svn")).is_err());
    }

    #[test]
    fn render_values_applies_placeholders_then_core_tokens_then_overrides() {
        let mut placeholders = HashMap::new();
        placeholders.insert("THEME".to_string(), "dark".to_string());
        let mut overrides = HashMap::new();
        overrides.insert("EXTRA".to_string(), "yes".to_string());
        let template = "theme={{THEME}} version={{.Version}} domain={{.Domain}} sub={{.Subdomain}} extra={{EXTRA}}";
        let rendered = render_values(template, &placeholders, "1.2.3", "example.com", "ide", &overrides);
        assert_eq!(
            rendered,
            "theme=dark version=1.2.3 domain=example.com sub=ide extra=yes"
        );
    }
}
