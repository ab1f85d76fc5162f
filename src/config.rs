use std::time::Duration;

pub const DEFAULT_JWT_SECRET: &str = "changeme";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

impl JwtConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_JWT_SECRET
    }
}

/// Outbound AI service settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first failed call. Zero disables retries.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound on one job's provider phase, retries and backoff included.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_retries + 1;
        self.timeout() * attempts + self.retry_backoff() * self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Argon2id cost. Defaults are the argon2 crate's recommended parameters.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Sweep that fails jobs left `processing` past any possible provider call.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl JobsConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` runs the gateway on in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub ai: AiConfig,
    pub password: PasswordConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = lookup("PORT")
            .or_else(|| lookup("APP_PORT"))
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);

        let jwt = JwtConfig {
            secret: string_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            issuer: string_or("JWT_ISSUER", "imagegate"),
            audience: string_or("JWT_AUDIENCE", "imagegate-users"),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 60),
        };
        anyhow::ensure!(jwt.ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");

        let ai = AiConfig {
            base_url: string_or("AI_BASE_URL", "http://ai:8000")
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: parse_or(&lookup, "AI_TIMEOUT_SECS", 30),
            max_retries: parse_or(&lookup, "AI_MAX_RETRIES", 0),
            retry_backoff_ms: parse_or(&lookup, "AI_RETRY_BACKOFF_MS", 500),
        };

        let password = PasswordConfig {
            memory_kib: parse_or(&lookup, "ARGON2_MEMORY_KIB", 19 * 1024),
            iterations: parse_or(&lookup, "ARGON2_ITERATIONS", 2),
            parallelism: parse_or(&lookup, "ARGON2_PARALLELISM", 1),
        };

        let jobs = JobsConfig {
            stale_after_secs: parse_or(&lookup, "ANALYSIS_STALE_AFTER_SECS", 600),
            sweep_interval_secs: parse_or(&lookup, "ANALYSIS_SWEEP_INTERVAL_SECS", 60),
        };
        anyhow::ensure!(
            jobs.stale_after() > ai.worst_case(),
            "ANALYSIS_STALE_AFTER_SECS must exceed the provider timeout times its attempts"
        );
        anyhow::ensure!(
            jobs.sweep_interval_secs > 0,
            "ANALYSIS_SWEEP_INTERVAL_SECS must be positive"
        );

        let storage = StorageConfig {
            bucket: string_or("S3_BUCKET", "uploads"),
            public_url: string_or("STORAGE_PUBLIC_URL", "http://minio:9000")
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            host: string_or("APP_HOST", "0.0.0.0"),
            port,
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10),
            jwt,
            ai,
            password,
            jobs,
            storage,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        db_max_connections: 1,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60,
        },
        ai: AiConfig {
            base_url: "http://ai.test".into(),
            timeout_secs: 1,
            max_retries: 0,
            retry_backoff_ms: 0,
        },
        // Cheap on purpose; production cost comes from the environment.
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        jobs: JobsConfig {
            stale_after_secs: 600,
            sweep_interval_secs: 60,
        },
        storage: StorageConfig {
            bucket: "test-bucket".into(),
            public_url: "http://storage.test".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned()).expect("config should parse")
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = from_map(&[]);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt.secret, DEFAULT_JWT_SECRET);
        assert!(cfg.jwt.uses_default_secret());
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.ai.base_url, "http://ai:8000");
        assert_eq!(cfg.ai.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.ai.max_retries, 0);
        assert_eq!(cfg.storage.bucket, "uploads");
        assert_eq!(cfg.password.memory_kib, 19456);
        assert_eq!(cfg.password.iterations, 2);
        assert_eq!(cfg.jobs.stale_after(), Duration::from_secs(600));
    }

    #[test]
    fn overrides_are_read_and_trimmed() {
        let cfg = from_map(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "s3cr3t"),
            ("AI_BASE_URL", "http://localhost:9000/"),
            ("AI_MAX_RETRIES", "2"),
            ("S3_BUCKET", "scans"),
        ]);
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://db/app"));
        assert!(!cfg.jwt.uses_default_secret());
        assert_eq!(cfg.ai.base_url, "http://localhost:9000");
        assert_eq!(cfg.ai.max_retries, 2);
        assert_eq!(cfg.storage.bucket, "scans");
    }

    #[test]
    fn app_port_is_used_when_port_is_absent() {
        let cfg = from_map(&[("APP_PORT", "9090")]);
        assert_eq!(cfg.port, 9090);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let cfg = from_map(&[("AI_TIMEOUT_SECS", "soon"), ("PORT", "http")]);
        assert_eq!(cfg.ai.timeout_secs, 30);
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn non_positive_token_ttl_is_rejected() {
        let err = AppConfig::from_lookup(|k| (k == "JWT_TTL_MINUTES").then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_MINUTES"));
    }

    #[test]
    fn worst_case_counts_every_attempt_and_backoff() {
        let cfg = from_map(&[
            ("AI_TIMEOUT_SECS", "10"),
            ("AI_MAX_RETRIES", "2"),
            ("AI_RETRY_BACKOFF_MS", "1000"),
        ]);
        assert_eq!(cfg.ai.worst_case(), Duration::from_secs(32));
    }

    #[test]
    fn stale_threshold_must_outlast_the_provider() {
        let vars = HashMap::from([
            ("AI_TIMEOUT_SECS", "120"),
            ("AI_MAX_RETRIES", "4"),
            ("ANALYSIS_STALE_AFTER_SECS", "300"),
        ]);
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains("ANALYSIS_STALE_AFTER_SECS"));
    }
}
