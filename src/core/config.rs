use std::env;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    runtime: RuntimeSettings,
    database: DatabaseSettings,
    redis: RedisSettings,
    s3: S3Settings,
    grading: GradingSettings,
    jobs: JobSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub postgres_server: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u16,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

/// Policy knobs for the grading core.
#[derive(Debug, Clone)]
pub struct GradingSettings {
    /// Applied when an assignment does not configure its own late penalty.
    pub default_late_penalty_percent: f64,
    /// Appeal tolerance window used when an assignment configures none.
    pub appeal_tolerance_minutes: i64,
    pub queue_page_limit: i64,
    pub bulk_max_batch: usize,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub queue_key: String,
    pub event_channel: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
    pub prometheus_listen: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("GRADEFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GRADEFLOW_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradeflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradeflow");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "10"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let s3_endpoint = env_or_default("S3_ENDPOINT", "http://localhost:9000");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "gradeflow-appeals");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let default_late_penalty_percent = parse_f64(
            "DEFAULT_LATE_PENALTY_PERCENT",
            env_or_default("DEFAULT_LATE_PENALTY_PERCENT", "10"),
        )?;
        let appeal_tolerance_minutes = parse_i64(
            "APPEAL_TOLERANCE_MINUTES",
            env_or_default("APPEAL_TOLERANCE_MINUTES", "0"),
        )?;
        let queue_page_limit =
            parse_i64("QUEUE_PAGE_LIMIT", env_or_default("QUEUE_PAGE_LIMIT", "100"))?;
        let bulk_max_batch =
            parse_usize("BULK_MAX_BATCH", env_or_default("BULK_MAX_BATCH", "500"))?;

        let queue_key = env_or_default("GRADING_JOB_QUEUE", "gradeflow:jobs");
        let event_channel = env_or_default("GRADING_EVENT_CHANNEL", "gradeflow:events");
        let poll_interval_ms = parse_u64(
            "WORKER_POLL_INTERVAL_MS",
            env_or_default("WORKER_POLL_INTERVAL_MS", "2000"),
        )?;

        let log_level = env_or_default("GRADEFLOW_LOG_LEVEL", "info");
        let json = env_optional("GRADEFLOW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_listen = env_or_default("PROMETHEUS_LISTEN", "0.0.0.0:9100");

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            grading: GradingSettings {
                default_late_penalty_percent,
                appeal_tolerance_minutes,
                queue_page_limit,
                bulk_max_batch,
            },
            jobs: JobSettings { queue_key, event_channel, poll_interval_ms },
            telemetry: TelemetrySettings {
                log_level,
                json,
                prometheus_enabled,
                prometheus_listen,
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub fn jobs(&self) -> &JobSettings {
        &self.jobs
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.grading.validate()?;

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

impl GradingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.default_late_penalty_percent) {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_LATE_PENALTY_PERCENT",
                value: self.default_late_penalty_percent.to_string(),
            });
        }
        if self.appeal_tolerance_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                field: "APPEAL_TOLERANCE_MINUTES",
                value: self.appeal_tolerance_minutes.to_string(),
            });
        }
        if self.queue_page_limit <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_PAGE_LIMIT",
                value: self.queue_page_limit.to_string(),
            });
        }
        if self.bulk_max_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "BULK_MAX_BATCH",
                value: String::from("0"),
            });
        }
        Ok(())
    }
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            default_late_penalty_percent: 10.0,
            appeal_tolerance_minutes: 0,
            queue_page_limit: 100,
            bulk_max_batch: 500,
        }
    }
}

impl DatabaseSettings {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl RedisSettings {
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { field, value }),
    }
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_i64(field: &'static str, value: String) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_usize(field: &'static str, value: String) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_f64(field: &'static str, value: String) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { field, value }),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }

    #[test]
    fn parse_f64_rejects_non_finite() {
        assert!(parse_f64("X", "NaN".to_string()).is_err());
        assert!(parse_f64("X", "abc".to_string()).is_err());
        assert_eq!(parse_f64("X", "12.5".to_string()).expect("float"), 12.5);
    }

    #[test]
    fn grading_settings_reject_out_of_range_penalty() {
        let settings =
            GradingSettings { default_late_penalty_percent: 120.0, ..GradingSettings::default() };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field: "DEFAULT_LATE_PENALTY_PERCENT", .. })
        ));
        assert!(GradingSettings::default().validate().is_ok());
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let redis = RedisSettings {
            host: "cache".to_string(),
            port: 6380,
            db: 2,
            password: "secret".to_string(),
        };
        assert_eq!(redis.redis_url(), "redis://:secret@cache:6380/2");
    }
}
