use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,

    // Sign-up confirmation codes
    pub confirmation_code_ttl_secs: i64,

    // Date bucketing
    pub default_timezone: String,
    pub log_window_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),
            jwt_refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "604800".into())
                .parse()
                .expect("JWT_REFRESH_TTL_SECS must be a number"),

            confirmation_code_ttl_secs: env::var("CONFIRMATION_CODE_TTL_SECS")
                .unwrap_or_else(|_| "86400".into())
                .parse()
                .unwrap_or(86400),

            default_timezone: env::var("DEFAULT_TIMEZONE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| crate::services::dates::DEFAULT_TIMEZONE.into()),
            log_window_days: env::var("LOG_WINDOW_DAYS")
                .unwrap_or_else(|_| "7".into())
                .parse()
                .unwrap_or(7),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configuration for tests and tooling that never touch the environment.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "postgres://localhost/kinisi_test".into(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: jwt_secret.into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
            confirmation_code_ttl_secs: 86400,
            default_timezone: crate::services::dates::DEFAULT_TIMEZONE.into(),
            log_window_days: 7,
        }
    }
}
