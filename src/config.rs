use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Worker configuration: the provisioning manifest, the generation version
/// tag, and the caching policy knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Store name prefix, shared across versions (e.g. "sustainnews").
  pub name: String,
  /// Version tag; bumping it starts a new generation.
  pub version: String,
  /// The app shell URL, served as the fallback when network and cache fail.
  pub shell: String,
  /// Ordered resource URLs provisioned eagerly at install.
  pub manifest: Vec<String>,
  /// URL markers selecting resources that are refreshed even on cache hit.
  #[serde(default)]
  pub revalidate: RevalidationSet,
  #[serde(default)]
  pub origin_policy: OriginPolicy,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shellcache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Invalid configuration: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  /// The generation identifier this configuration provisions.
  pub fn generation(&self) -> String {
    format!("{}-{}", self.name, self.version)
  }

  pub fn shell_url(&self) -> Result<Url> {
    Url::parse(&self.shell).map_err(|e| eyre!("Invalid shell URL {}: {}", self.shell, e))
  }

  pub fn validate(&self) -> Result<()> {
    if self.name.is_empty() || self.version.is_empty() {
      return Err(eyre!("Config requires a non-empty name and version"));
    }

    self.shell_url()?;
    for entry in &self.manifest {
      Url::parse(entry).map_err(|e| eyre!("Invalid manifest URL {}: {}", entry, e))?;
    }

    // The fallback only works if the shell itself gets provisioned.
    if !self.manifest.iter().any(|entry| entry == &self.shell) {
      return Err(eyre!(
        "Shell URL {} must be listed in the manifest",
        self.shell
      ));
    }

    Ok(())
  }
}

/// Predicate selecting resources whose cached copy is never final: every
/// cache hit for a matching URL also triggers a background refresh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RevalidationSet(Vec<String>);

impl RevalidationSet {
  pub fn new(markers: Vec<String>) -> Self {
    Self(markers)
  }

  pub fn matches(&self, url: &Url) -> bool {
    self.0.iter().any(|marker| url.as_str().contains(marker))
  }
}

/// Which origins are cacheable during steady-state interception.
///
/// Manifest entries are exempt: resources pinned there provision regardless
/// of origin.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OriginPolicy {
  /// Cache successful responses from any origin, CDNs included.
  #[default]
  Any,
  /// Only cache responses from the app shell's own origin.
  SameOrigin,
}

impl OriginPolicy {
  pub fn allows(&self, url: &Url, shell: &Url) -> bool {
    match self {
      OriginPolicy::Any => true,
      OriginPolicy::SameOrigin => url.origin() == shell.origin(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const YAML: &str = r#"
name: sustainnews
version: v3
shell: https://example.org/index.html
manifest:
  - https://example.org/
  - https://example.org/index.html
  - https://example.org/news.json
revalidate:
  - news.json
"#;

  #[test]
  fn test_from_yaml() {
    let config = Config::from_yaml(YAML).unwrap();

    assert_eq!(config.generation(), "sustainnews-v3");
    assert_eq!(config.manifest.len(), 3);
    assert_eq!(config.origin_policy, OriginPolicy::Any);

    let feed = Url::parse("https://example.org/news.json").unwrap();
    let page = Url::parse("https://example.org/index.html").unwrap();
    assert!(config.revalidate.matches(&feed));
    assert!(!config.revalidate.matches(&page));
  }

  #[test]
  fn test_origin_policy_parsing() {
    let yaml = format!("{}origin_policy: same-origin\n", YAML);
    let config = Config::from_yaml(&yaml).unwrap();
    assert_eq!(config.origin_policy, OriginPolicy::SameOrigin);
  }

  #[test]
  fn test_shell_must_be_in_manifest() {
    let yaml = r#"
name: sustainnews
version: v3
shell: https://example.org/index.html
manifest:
  - https://example.org/news.json
"#;
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_same_origin_policy() {
    let shell = Url::parse("https://example.org/index.html").unwrap();
    let local = Url::parse("https://example.org/style.css").unwrap();
    let cdn = Url::parse("https://cdn.example.net/lib.js").unwrap();

    assert!(OriginPolicy::Any.allows(&cdn, &shell));
    assert!(OriginPolicy::SameOrigin.allows(&local, &shell));
    assert!(!OriginPolicy::SameOrigin.allows(&cdn, &shell));
  }
}
