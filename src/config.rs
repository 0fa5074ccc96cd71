use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub partner_directory_url: Option<String>,
    pub partner_directory_token: Option<String>,
    pub reconstruct_batch_size: usize,
    pub bulk_batch_size: usize,
    pub dedup_hash: DedupHashMode,
    pub schema: SchemaFlags,
}

/// Digest used for residual-event dedup hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupHashMode {
    #[default]
    Sha256,
    /// 32-bit rolling hash, for stores populated by clients without a digest.
    Rolling,
}

/// Legacy vs normalized participant storage.
///
/// Participants always live as a JSON array on the deal row. The normalized
/// `deal_participants` table is written and/or read depending on these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaFlags {
    pub read_normalized_participants: bool,
    pub write_normalized_participants: bool,
}

impl Default for SchemaFlags {
    fn default() -> Self {
        SchemaFlags {
            read_normalized_participants: false,
            write_normalized_participants: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let partner_directory_url = optional(&env_map, "PARTNER_DIRECTORY_URL");
        let partner_directory_token = optional(&env_map, "PARTNER_DIRECTORY_TOKEN");

        let reconstruct_batch_size = parse_batch_size(&env_map, "RECONSTRUCT_BATCH_SIZE", 100)?;
        let bulk_batch_size = parse_batch_size(&env_map, "BULK_BATCH_SIZE", 50)?;

        let dedup_hash = match env_map
            .get("DEDUP_HASH")
            .map(|s| s.as_str())
            .unwrap_or("sha256")
        {
            "sha256" => DedupHashMode::Sha256,
            "rolling" => DedupHashMode::Rolling,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DEDUP_HASH".to_string(),
                    format!("must be sha256 or rolling, got {}", other),
                ))
            }
        };

        let defaults = SchemaFlags::default();
        let schema = SchemaFlags {
            read_normalized_participants: parse_flag(
                &env_map,
                "READ_NORMALIZED_PARTICIPANTS",
                defaults.read_normalized_participants,
            )?,
            write_normalized_participants: parse_flag(
                &env_map,
                "WRITE_NORMALIZED_PARTICIPANTS",
                defaults.write_normalized_participants,
            )?,
        };

        if schema.read_normalized_participants && !schema.write_normalized_participants {
            return Err(ConfigError::InvalidValue(
                "READ_NORMALIZED_PARTICIPANTS".to_string(),
                "requires WRITE_NORMALIZED_PARTICIPANTS=true".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            partner_directory_url,
            partner_directory_token,
            reconstruct_batch_size,
            bulk_batch_size,
            dedup_hash,
            schema,
        })
    }
}

fn optional(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_batch_size(
    env_map: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                "must be a positive integer".to_string(),
            )),
        },
    }
}

fn parse_flag(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a boolean, got {}", v),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reconstruct_batch_size, 100);
        assert_eq!(config.bulk_batch_size, 50);
        assert_eq!(config.dedup_hash, DedupHashMode::Sha256);
        assert_eq!(config.schema, SchemaFlags::default());
        assert!(config.partner_directory_url.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("BULK_BATCH_SIZE".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BULK_BATCH_SIZE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_dedup_hash() {
        let mut env_map = setup_required_env();
        env_map.insert("DEDUP_HASH".to_string(), "md5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DEDUP_HASH"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_schema_flags_parsed() {
        let mut env_map = setup_required_env();
        env_map.insert("READ_NORMALIZED_PARTICIPANTS".to_string(), "true".to_string());
        env_map.insert("WRITE_NORMALIZED_PARTICIPANTS".to_string(), "1".to_string());
        env_map.insert("PARTNER_DIRECTORY_URL".to_string(), "https://dir".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert!(config.schema.read_normalized_participants);
        assert_eq!(config.partner_directory_url.as_deref(), Some("https://dir"));
    }

    #[test]
    fn test_read_normalized_requires_write() {
        let mut env_map = setup_required_env();
        env_map.insert("READ_NORMALIZED_PARTICIPANTS".to_string(), "true".to_string());
        env_map.insert("WRITE_NORMALIZED_PARTICIPANTS".to_string(), "false".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }
}
