use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_number, parse_storage_backend,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, GraderSettings,
    NotificationSettings, PaperGeneratorSettings, RuntimeSettings, SecuritySettings, ServerHost,
    ServerPort, ServerSettings, Settings, StorageBackend, StorageSettings, SweepSettings,
    TelemetrySettings,
};

const DEV_SECRET_KEY: &str = "exam-lifecycle-dev-secret";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMS_HOST", "0.0.0.0");
        let port = env_or_default("EXAMS_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Lifecycle API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_or_default("SECRET_KEY", "");
        let access_token_expire_minutes = parse_number::<u64>(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port =
            parse_number::<u16>("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exams");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exams_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_number::<u32>("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "30"))?;

        let backend = parse_storage_backend(env_or_default("STORAGE_BACKEND", "postgres"))?;
        let memory_seed_path = env_optional("MEMORY_SEED_PATH");

        let grader_base_url = env_or_default("GRADER_BASE_URL", "");
        let grader_api_key = env_or_default("GRADER_API_KEY", "");
        let grader_timeout =
            parse_number::<u64>("GRADER_REQUEST_TIMEOUT", env_or_default("GRADER_REQUEST_TIMEOUT", "120"))?;
        let grader_max_retries =
            parse_number::<u32>("GRADER_MAX_RETRIES", env_or_default("GRADER_MAX_RETRIES", "3"))?;

        let papers_base_url = env_or_default("PAPER_GENERATOR_BASE_URL", "");
        let papers_timeout = parse_number::<u64>(
            "PAPER_GENERATOR_TIMEOUT",
            env_or_default("PAPER_GENERATOR_TIMEOUT", "300"),
        )?;

        let webhook_url = env_optional("NOTIFY_WEBHOOK_URL");
        let notify_timeout =
            parse_number::<u64>("NOTIFY_TIMEOUT_SECONDS", env_or_default("NOTIFY_TIMEOUT_SECONDS", "5"))?;

        let sweep_interval =
            parse_number::<u64>("SWEEP_INTERVAL_SECONDS", env_or_default("SWEEP_INTERVAL_SECONDS", "60"))?;

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            storage: StorageSettings { backend, memory_seed_path },
            grader: GraderSettings {
                base_url: grader_base_url,
                api_key: grader_api_key,
                request_timeout_seconds: grader_timeout,
                max_retries: grader_max_retries,
            },
            paper_generator: PaperGeneratorSettings {
                base_url: papers_base_url,
                request_timeout_seconds: papers_timeout,
            },
            notifications: NotificationSettings { webhook_url, timeout_seconds: notify_timeout },
            sweep: SweepSettings { interval_seconds: sweep_interval },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn grader(&self) -> &GraderSettings {
        &self.grader
    }

    pub(crate) fn paper_generator(&self) -> &PaperGeneratorSettings {
        &self.paper_generator
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn sweep(&self) -> &SweepSettings {
        &self.sweep
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.sweep.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.grader.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if self.paper_generator.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PAPER_GENERATOR_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            if self.security.secret_key.is_empty() {
                self.security.secret_key = DEV_SECRET_KEY.to_string();
            }
            return Ok(self);
        }

        if self.security.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.grader.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("GRADER_BASE_URL"));
        }
        if self.storage.backend == StorageBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn strict_mode_requires_secret_key() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("EXAMS_STRICT_CONFIG", "1");
        std::env::remove_var("SECRET_KEY");

        let result = Settings::load();
        std::env::set_var("EXAMS_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::MissingSecret("SECRET_KEY"))));
    }

    #[test]
    fn development_mode_falls_back_to_dev_secret() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::remove_var("SECRET_KEY");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.security().secret_key, DEV_SECRET_KEY);
        assert_eq!(settings.storage().backend, StorageBackend::Memory);
    }

    #[test]
    fn paper_generator_is_disabled_by_default_and_needs_a_timeout() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert!(settings.paper_generator().base_url.is_empty());
        assert_eq!(settings.paper_generator().request_timeout_seconds, 300);

        std::env::set_var("PAPER_GENERATOR_TIMEOUT", "0");
        let result = Settings::load();
        std::env::remove_var("PAPER_GENERATOR_TIMEOUT");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "PAPER_GENERATOR_TIMEOUT", .. })
        ));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("SWEEP_INTERVAL_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("SWEEP_INTERVAL_SECONDS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "SWEEP_INTERVAL_SECONDS", .. })
        ));
    }
}
