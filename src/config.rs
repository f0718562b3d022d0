use crate::errors::QueryMapError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MONGO_OPERATORS_CONFIG";
pub const CONFIG_FILE_NAME: &str = "mongo-operators.toml";

/// Knobs for the translator. Every field has a default so partial TOML files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Separates a field name from its modifier suffix (`age_gte`).
    pub delimiter: String,
    /// Separates a sort field from its direction (`age:desc`).
    pub sort_separator: String,
    /// Top-level key holding the base filter object.
    pub where_key: String,
    pub limit_key: String,
    pub skip_key: String,
    pub sort_key: String,
    pub max_limit: Option<i64>,
    /// Turn numeric/boolean strings from query strings into typed values.
    pub coerce_values: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            delimiter: "_".into(),
            sort_separator: ":".into(),
            where_key: "where".into(),
            limit_key: "limit".into(),
            skip_key: "skip".into(),
            sort_key: "sort".into(),
            max_limit: None,
            coerce_values: true,
        }
    }
}

impl TranslatorConfig {
    /// # Errors
    /// Returns an error if a separator or reserved key is empty, or `max_limit` is not positive.
    pub fn validate(&self) -> Result<(), QueryMapError> {
        if self.delimiter.is_empty() {
            return Err(QueryMapError::Config("delimiter must not be empty".into()));
        }
        if self.sort_separator.is_empty() {
            return Err(QueryMapError::Config("sort_separator must not be empty".into()));
        }
        for (name, key) in [
            ("where_key", &self.where_key),
            ("limit_key", &self.limit_key),
            ("skip_key", &self.skip_key),
            ("sort_key", &self.sort_key),
        ] {
            if key.is_empty() {
                return Err(QueryMapError::Config(format!("{name} must not be empty")));
            }
        }
        let keys = [&self.where_key, &self.limit_key, &self.skip_key, &self.sort_key];
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].contains(key) {
                return Err(QueryMapError::Config(format!("reserved key {key:?} is used twice")));
            }
        }
        if let Some(max) = self.max_limit
            && max <= 0
        {
            return Err(QueryMapError::Config(format!("max_limit must be positive, got {max}")));
        }
        Ok(())
    }

    /// Returns true when `key` is one of the top-level shaping/base-filter keys.
    pub fn is_reserved(&self, key: &str) -> bool {
        key == self.limit_key || key == self.skip_key || key == self.sort_key || key == self.where_key
    }

    /// # Errors
    /// Returns an error if the TOML cannot be parsed or holds invalid values.
    pub fn from_toml_str(s: &str) -> Result<Self, QueryMapError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, QueryMapError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Apply `MONGO_OPERATORS_DELIMITER`, `MONGO_OPERATORS_MAX_LIMIT` and
    /// `MONGO_OPERATORS_COERCE` when set. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// [`TranslatorConfig::apply_env`] over an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(d) = lookup("MONGO_OPERATORS_DELIMITER")
            && !d.is_empty()
        {
            self.delimiter = d;
        }
        if let Some(max) = lookup("MONGO_OPERATORS_MAX_LIMIT")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|m| *m > 0)
        {
            self.max_limit = Some(max);
        }
        if let Some(s) = lookup("MONGO_OPERATORS_COERCE") {
            self.coerce_values = matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

/// Candidate config files in precedence order.
pub fn config_paths(cli_path: Option<&Path>) -> Vec<PathBuf> {
    search_paths(
        cli_path,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        dirs_next::config_dir(),
        std::env::current_dir().ok(),
    )
}

/// Order the candidate locations: explicit path, env path, user config dir, working dir.
pub fn search_paths(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    cwd: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = vec![];
    if let Some(p) = cli_path {
        paths.push(p.to_path_buf());
    }
    paths.extend(env_path);
    paths.extend(config_dir.map(|d| d.join(CONFIG_FILE_NAME)));
    paths.extend(cwd.map(|d| d.join(CONFIG_FILE_NAME)));
    paths
}

/// First existing file in `paths`, parsed; defaults when none exists.
///
/// # Errors
/// Returns an error if the chosen file cannot be parsed.
pub fn load_first(paths: &[PathBuf]) -> Result<TranslatorConfig, QueryMapError> {
    for p in paths {
        if p.exists() {
            log::debug!("loading translator config from {}", p.display());
            return TranslatorConfig::from_path(p);
        }
    }
    Ok(TranslatorConfig::default())
}

/// Load configuration. Precedence: explicit path > env path > user config dir >
/// working directory > defaults; environment overrides are applied last.
///
/// # Errors
/// Returns an error if an existing config file cannot be parsed. An explicit
/// `cli_path` that does not exist is also an error.
pub fn load_config(cli_path: Option<&Path>) -> Result<TranslatorConfig, QueryMapError> {
    if let Some(p) = cli_path
        && !p.exists()
    {
        return Err(QueryMapError::Config(format!("config file not found: {}", p.display())));
    }
    let mut cfg = load_first(&config_paths(cli_path))?;
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = TranslatorConfig::from_toml_str("delimiter = \"__\"\nmax_limit = 50\n").unwrap();
        assert_eq!(cfg.delimiter, "__");
        assert_eq!(cfg.max_limit, Some(50));
        assert_eq!(cfg.sort_separator, ":");
        assert_eq!(cfg.where_key, "where");
        assert!(cfg.coerce_values);
    }

    #[test]
    fn rejects_empty_delimiter() {
        let err = TranslatorConfig::from_toml_str("delimiter = \"\"").unwrap_err();
        assert!(matches!(err, QueryMapError::Config(_)));
    }

    #[test]
    fn rejects_non_positive_max_limit() {
        assert!(TranslatorConfig::from_toml_str("max_limit = 0").is_err());
    }

    #[test]
    fn rejects_clashing_reserved_keys() {
        let err = TranslatorConfig::from_toml_str("skip_key = \"limit\"").unwrap_err();
        assert!(matches!(err, QueryMapError::Config(_)));
    }

    #[test]
    fn reserved_keys() {
        let cfg = TranslatorConfig::default();
        assert!(cfg.is_reserved("limit"));
        assert!(cfg.is_reserved("where"));
        assert!(!cfg.is_reserved("name"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cfg.toml");
        std::fs::write(&p, "sort_separator = \".\"\n").unwrap();
        let cfg = load_config(Some(&p)).unwrap();
        assert_eq!(cfg.sort_separator, ".");
    }

    #[test]
    fn search_order_and_first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user_dir = dir.path().join("user");
        let cwd = dir.path().join("cwd");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::create_dir_all(&cwd).unwrap();
        let env_file = dir.path().join("env.toml");

        let paths = search_paths(None, Some(env_file.clone()), Some(user_dir.clone()), Some(cwd.clone()));
        assert_eq!(
            paths,
            vec![env_file.clone(), user_dir.join(CONFIG_FILE_NAME), cwd.join(CONFIG_FILE_NAME)]
        );
        assert_eq!(load_first(&paths).unwrap(), TranslatorConfig::default());

        std::fs::write(cwd.join(CONFIG_FILE_NAME), "max_limit = 30\n").unwrap();
        assert_eq!(load_first(&paths).unwrap().max_limit, Some(30));
        std::fs::write(user_dir.join(CONFIG_FILE_NAME), "max_limit = 20\n").unwrap();
        assert_eq!(load_first(&paths).unwrap().max_limit, Some(20));
        std::fs::write(&env_file, "max_limit = 10\n").unwrap();
        assert_eq!(load_first(&paths).unwrap().max_limit, Some(10));

        let cli = dir.path().join("cli.toml");
        std::fs::write(&cli, "delimiter = \"__\"\n").unwrap();
        let paths = search_paths(Some(&cli), Some(env_file), Some(user_dir), Some(cwd));
        let cfg = load_first(&paths).unwrap();
        assert_eq!(cfg.delimiter, "__");
        assert_eq!(cfg.max_limit, None);
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let mut cfg = TranslatorConfig::from_toml_str("delimiter = \"__\"\nmax_limit = 5\n").unwrap();
        cfg.apply_overrides(|name| match name {
            "MONGO_OPERATORS_MAX_LIMIT" => Some("50".into()),
            "MONGO_OPERATORS_COERCE" => Some("no".into()),
            _ => None,
        });
        assert_eq!(cfg.delimiter, "__");
        assert_eq!(cfg.max_limit, Some(50));
        assert!(!cfg.coerce_values);
    }

    #[test]
    fn unusable_overrides_are_ignored() {
        let mut cfg = TranslatorConfig::default();
        cfg.apply_overrides(|name| match name {
            "MONGO_OPERATORS_DELIMITER" => Some(String::new()),
            "MONGO_OPERATORS_MAX_LIMIT" => Some("-4".into()),
            _ => None,
        });
        assert_eq!(cfg, TranslatorConfig::default());
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nope.toml");
        assert!(load_config(Some(&p)).is_err());
    }
}
