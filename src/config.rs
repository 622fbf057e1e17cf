use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub routes: RoutesConfig,
  #[serde(default)]
  pub viewport: ViewportConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub session: SessionConfig,
}

/// Static route tables. Every entry is matched as a substring of the path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Routes the offline cache controller intercepts
  pub pwa: Vec<String>,
  /// Routes that always render without navigation chrome
  pub mobile_only: Vec<String>,
  /// Query-string tokens that force the mobile layout (e.g. `adminLogin`)
  pub mobile_markers: Vec<String>,
  /// Public routes that skip the session gate
  pub auth_exempt: Vec<String>,
  /// Login entry point for unauthenticated redirects
  pub login_path: String,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      pwa: vec!["/master/user/occupant-users".to_string()],
      mobile_only: vec![
        "/master/user/occupant-users".to_string(),
        "/mobile".to_string(),
      ],
      mobile_markers: vec!["adminLogin".to_string()],
      auth_exempt: vec![
        "/login".to_string(),
        "/forgot-password".to_string(),
        "/reset-password".to_string(),
      ],
      login_path: "/login".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
  /// Widths strictly below this are mobile
  pub breakpoint: u32,
  /// User-agent tokens (case-insensitive) that identify mobile devices
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub mobile_user_agents: BTreeSet<String>,
}

impl Default for ViewportConfig {
  fn default() -> Self {
    let tokens = [
      "android",
      "webos",
      "iphone",
      "ipad",
      "ipod",
      "blackberry",
      "iemobile",
      "opera mini",
      "mobile",
    ];
    Self {
      breakpoint: 768,
      mobile_user_agents: tokens.iter().map(|t| t.to_string()).collect(),
    }
  }
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current cache generation; bump on deploy
  pub version: String,
  /// Application origin used to resolve relative URLs
  pub origin: String,
  /// Assets pre-populated during install
  pub shell_assets: Vec<String>,
  /// Asset served when the network is unreachable
  pub shell_document: String,
  /// Cache database location (defaults to the data directory)
  pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "occupant-users-v1".to_string(),
      origin: "http://localhost:3000".to_string(),
      shell_assets: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
        "/master/user/occupant-users".to_string(),
      ],
      shell_document: "/index.html".to_string(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Persisted client storage file (defaults to the data directory)
  pub path: Option<PathBuf>,
  /// Key holding the serialized user record
  pub user_key: String,
  /// Key holding the bearer token
  pub token_key: String,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      path: None,
      user_key: "user".to_string(),
      token_key: "token".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fmpwa.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fmpwa/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("fmpwa.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fmpwa").join("config.yaml");
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
    // An empty document deserializes to unit, not to an empty map
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the per-user data directory for caches, sessions and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fmpwa"))
  }

  pub fn cache_database_path(&self) -> Result<PathBuf> {
    match &self.cache.database {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("cache.db")),
    }
  }

  pub fn session_path(&self) -> Result<PathBuf> {
    match &self.session.path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("session.json")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_yaml_uses_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.cache.version, "occupant-users-v1");
    assert_eq!(config.viewport.breakpoint, 768);
    assert_eq!(config.routes.login_path, "/login");
  }

  #[test]
  fn test_partial_section_keeps_other_defaults() {
    let yaml = r#"
cache:
  version: occupant-users-v2
viewport:
  mobile_user_agents: [Android, IPhone]
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.cache.version, "occupant-users-v2");
    assert_eq!(config.cache.shell_document, "/index.html");
    assert_eq!(config.viewport.breakpoint, 768);
    assert!(config.viewport.mobile_user_agents.contains("android"));
    assert!(config.viewport.mobile_user_agents.contains("iphone"));
    assert_eq!(config.routes.pwa, vec!["/master/user/occupant-users"]);
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/nonexistent/fmpwa.yaml")));
    assert!(result.is_err());
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fmpwa.yaml");
    std::fs::write(&path, "routes:\n  pwa: [/a/b]\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.routes.pwa, vec!["/a/b"]);
    assert_eq!(config.routes.mobile_markers, vec!["adminLogin"]);
  }
}
