use {
    crate::{Error, Result},
    serde::Deserialize,
    std::{fmt, path::PathBuf},
};

/// Name of the package that is always active and owns the error controller.
pub const MAIN_PACKAGE: &str = "main";

///
/// Deployment stage of the application, exposed to controllers as the
/// `AppStage` resource.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppStage {
    Development,
    Test,
    #[default]
    Production,
}

impl fmt::Display for AppStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppStage::Development => write!(f, "development"),
            AppStage::Test => write!(f, "test"),
            AppStage::Production => write!(f, "production"),
        }
    }
}

///
/// The `[application]` section.
///
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// By default `stage` is `production`.
    #[serde(default)]
    pub stage: AppStage,

    /// Active packages in route declaration order. `main` is always active
    /// and always first, whether or not it is listed here.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Directory holding `packages/<name>/views` and `packages/<name>/layouts`.
    /// By default `root` is `application`.
    #[serde(default = "ApplicationConfig::default_root")]
    pub root: PathBuf,

    /// Page cache directory. By default `cache_dir` is `application/cache`.
    #[serde(default = "ApplicationConfig::default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Role used until a package role resolver says otherwise.
    /// By default `default_role` is `guest`.
    #[serde(default = "ApplicationConfig::default_role")]
    pub default_role: String,

    /// Layout directory used when a package does not set `mvc.layout_path`.
    #[serde(default)]
    pub layout_path: Option<PathBuf>,

    /// Error layout directory used when a package does not set `mvc.error_layout_path`.
    #[serde(default)]
    pub error_layout_path: Option<PathBuf>,
}

impl ApplicationConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("application")
    }

    fn default_cache_dir() -> PathBuf {
        PathBuf::from("application/cache")
    }

    fn default_role() -> String {
        "guest".into()
    }

    ///
    /// Returns the active packages with `main` first and duplicates removed.
    ///
    pub fn active_packages(&self) -> Vec<String> {
        let mut active = vec![MAIN_PACKAGE.to_string()];
        for package in &self.packages {
            if !active.contains(package) {
                active.push(package.clone());
            }
        }
        active
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(empty) = self.packages.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::config(format!(
                "[application] packages contains an empty package name: {:?}",
                empty
            )));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::config(
                "[application] cache_dir must not be empty. Set cache_dir = \"application/cache\" in config.",
            ));
        }

        if self.default_role.trim().is_empty() {
            return Err(Error::config("[application] default_role must not be empty"));
        }

        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            stage: AppStage::default(),
            packages: Vec::new(),
            root: Self::default_root(),
            cache_dir: Self::default_cache_dir(),
            default_role: Self::default_role(),
            layout_path: None,
            error_layout_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_main_is_always_first() {
        let config = ApplicationConfig {
            packages: vec!["blog".into(), "main".into(), "shop".into(), "blog".into()],
            ..Default::default()
        };
        assert_eq!(config.active_packages(), vec!["main", "blog", "shop"]);

        let config = ApplicationConfig::default();
        assert_eq!(config.active_packages(), vec!["main"]);
    }

    #[test]
    fn test_defaults() {
        let config: ApplicationConfig = toml::from_str("").unwrap();
        assert_eq!(config.stage, AppStage::Production);
        assert_eq!(config.root, PathBuf::from("application"));
        assert_eq!(config.cache_dir, PathBuf::from("application/cache"));
        assert_eq!(config.default_role, "guest");
        assert!(config.layout_path.is_none());
    }

    #[test]
    fn test_stage_parsing_and_display() {
        let config: ApplicationConfig = toml::from_str("stage = \"development\"").unwrap();
        assert_eq!(config.stage, AppStage::Development);
        assert_eq!(config.stage.to_string(), "development");
        assert!(toml::from_str::<ApplicationConfig>("stage = \"staging\"").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_values() {
        let config = ApplicationConfig {
            packages: vec!["  ".into()],
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let config = ApplicationConfig {
            cache_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(ApplicationConfig::default().validate().is_ok());
    }
}
