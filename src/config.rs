use std::env;
use std::ops::RangeInclusive;

const SESSION_DAYS: RangeInclusive<i64> = 1..=3650;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub base_path: String,
    pub session_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("ORDO_PORT").ok_or(ConfigError::Missing("ORDO_PORT"))?;
        let port = port.parse().map_err(|_| ConfigError::Invalid {
            name: "ORDO_PORT",
            value: port,
        })?;

        let database_path = lookup("ORDO_DATABASE")
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| "ordo.db".to_string());

        let base_path = lookup("ORDO_BASE_PATH")
            .map(|path| normalize_base_path(&path))
            .unwrap_or_default();

        let session_days = match lookup("ORDO_SESSION_DAYS") {
            Some(value) => match value.parse::<i64>() {
                Ok(days) if SESSION_DAYS.contains(&days) => days,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "ORDO_SESSION_DAYS",
                        value,
                    })
                }
            },
            None => 7,
        };

        Ok(Config {
            port,
            database_path,
            base_path,
            session_days,
        })
    }
}

fn normalize_base_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_port_is_set() {
        let config = Config::from_lookup(lookup(&[("ORDO_PORT", "8080")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, "ordo.db");
        assert_eq!(config.base_path, "");
        assert_eq!(config.session_days, 7);
    }

    #[test]
    fn port_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ORDO_PORT")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("ORDO_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ORDO_PORT", .. }));

        let err = Config::from_lookup(lookup(&[("ORDO_PORT", "1"), ("ORDO_SESSION_DAYS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "ORDO_SESSION_DAYS",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[
            ("ORDO_PORT", "1"),
            ("ORDO_SESSION_DAYS", "3651"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "ORDO_SESSION_DAYS",
                ..
            }
        ));
        let config = Config::from_lookup(lookup(&[
            ("ORDO_PORT", "1"),
            ("ORDO_SESSION_DAYS", "3650"),
        ]))
        .unwrap();
        assert_eq!(config.session_days, 3650);
    }

    #[test]
    fn base_path_is_normalized() {
        assert_eq!(normalize_base_path("todo/"), "/todo");
        assert_eq!(normalize_base_path("/todo"), "/todo");
        assert_eq!(normalize_base_path("/"), "");
    }
}
