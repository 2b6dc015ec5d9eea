//! Runtime environment resolution.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Default variable consulted by [`EnvVarSource`].
pub const DEFAULT_ENV_VAR: &str = "APP_ENV";

/// A named deployment environment. Selects which override directory applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
    Staging,
    Uat,
    /// Any other name; used verbatim as the directory name.
    Custom(String),
}

impl Environment {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Uat => "uat",
            Self::Custom(name) => name,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, Self::Staging)
    }

    pub fn is_uat(&self) -> bool {
        matches!(self, Self::Uat)
    }
}

impl FromStr for Environment {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let env = match s.to_ascii_lowercase().as_str() {
            "development" => Self::Development,
            "production" => Self::Production,
            "test" => Self::Test,
            "staging" => Self::Staging,
            "uat" => Self::Uat,
            _ => Self::Custom(s.to_string()),
        };
        Ok(env)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies the runtime environment indicator, if one is set.
pub trait EnvironmentSource: Send + Sync + fmt::Debug {
    fn current(&self) -> Option<Environment>;
}

/// Reads the environment name from a process environment variable.
///
/// Unset, empty and whitespace-only values count as "not set".
#[derive(Debug, Clone)]
pub struct EnvVarSource {
    var: String,
}

impl EnvVarSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvVarSource {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_VAR)
    }
}

impl EnvironmentSource for EnvVarSource {
    fn current(&self) -> Option<Environment> {
        let value = std::env::var(&self.var).ok()?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse().ok()
    }
}

/// A fixed environment, or none at all.
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment(pub Option<Environment>);

impl EnvironmentSource for FixedEnvironment {
    fn current(&self) -> Option<Environment> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_named_environments_parse_case_insensitively() {
        let parse = |s: &str| s.parse::<Environment>().unwrap();
        assert_eq!(parse("production"), Environment::Production);
        assert_eq!(parse("UAT"), Environment::Uat);
        assert_eq!(parse("Staging"), Environment::Staging);
    }

    #[test]
    fn test_unknown_name_is_custom() {
        let env: Environment = "qa-eu".parse().unwrap();
        assert_eq!(env, Environment::Custom("qa-eu".to_string()));
        assert_eq!(env.as_str(), "qa-eu");
        assert!(!env.is_production());
    }

    #[test]
    fn test_predicates() {
        assert!(Environment::default().is_development());
        assert!(Environment::Test.is_test());
        assert!(Environment::Staging.is_staging());
        assert!(Environment::Uat.is_uat());
        assert!(!Environment::Production.is_development());
    }

    #[test]
    #[serial]
    fn test_env_var_source_reads_variable() {
        temp_env::with_var("LAYERCONF_TEST_ENV", Some(" production "), || {
            let source = EnvVarSource::new("LAYERCONF_TEST_ENV");
            assert_eq!(source.current(), Some(Environment::Production));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_source_empty_is_unset() {
        temp_env::with_var("LAYERCONF_TEST_ENV", Some("   "), || {
            assert_eq!(EnvVarSource::new("LAYERCONF_TEST_ENV").current(), None);
        });
        temp_env::with_var_unset("LAYERCONF_TEST_ENV", || {
            assert_eq!(EnvVarSource::new("LAYERCONF_TEST_ENV").current(), None);
        });
    }
}
