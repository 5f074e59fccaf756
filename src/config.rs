use dotenvy::dotenv;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url:     String,

    // Backend
    pub backend_host:     String,
    pub backend_port:     u16,

    // Tokens
    pub jwt_secret:       String,
    pub jwt_ttl_hours:    i64,

    // Files
    pub settings_path:    String,
    pub audio_dir:        String,

    // Speech synthesis (disabled when no key is configured)
    pub tts_api_key:      Option<String>,
    pub tts_endpoint:     String,

    // Seeded accounts
    pub admin_password:   String,
    pub system_password:  String,

    // App
    pub app_env:          String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        fn require(key: &str) -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        }

        fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
            match env::var(key) {
                Ok(raw) => raw
                    .parse::<T>()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
                Err(_) => Ok(default),
            }
        }

        let jwt_ttl_hours: i64 = parse_or("JWT_TTL_HOURS", 8)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::InvalidValue(
                "JWT_TTL_HOURS".into(),
                jwt_ttl_hours.to_string(),
            ));
        }

        Ok(Self {
            database_url:  env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/turnera.db?mode=rwc".into()),

            backend_host:  env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            backend_port:  parse_or("BACKEND_PORT", 3000)?,

            jwt_secret:    require("JWT_SECRET")?,
            jwt_ttl_hours,

            settings_path: env::var("SETTINGS_PATH").unwrap_or_else(|_| "config/settings.json".into()),
            audio_dir:     env::var("AUDIO_DIR").unwrap_or_else(|_| "public/audio".into()),

            tts_api_key:   env::var("TTS_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            tts_endpoint:  env::var("TTS_ENDPOINT").unwrap_or_else(|_| {
                "https://texttospeech.googleapis.com/v1/text:synthesize".into()
            }),

            admin_password:  env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".into()),
            system_password: env::var("SYSTEM_PASSWORD").unwrap_or_else(|_| "sistema123".into()),

            app_env:       env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by unit tests; paths point into `dir`.
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            database_url:    format!("sqlite://{}?mode=rwc", dir.join("test.db").display()),
            backend_host:    "127.0.0.1".into(),
            backend_port:    0,
            jwt_secret:      "test-secret-with-enough-entropy".into(),
            jwt_ttl_hours:   8,
            settings_path:   dir.join("settings.json").display().to_string(),
            audio_dir:       dir.join("audio").display().to_string(),
            tts_api_key:     None,
            tts_endpoint:    "http://127.0.0.1:9/unreachable".into(),
            admin_password:  "admin123".into(),
            system_password: "sistema123".into(),
            app_env:         "test".into(),
        }
    }
}
