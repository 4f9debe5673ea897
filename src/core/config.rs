use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;

const REAL_API_URL: &str = "wss://ws.xtb.com/real";
const DEMO_API_URL: &str = "wss://ws.xtb.com/demo";
const REAL_STREAM_URL: &str = "wss://ws.xtb.com/realStream";
const DEMO_STREAM_URL: &str = "wss://ws.xtb.com/demoStream";

const DEFAULT_APP_NAME: &str = "xapi-client";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_id: Secret<String>,
    pub password: Secret<String>,
    pub app_name: String,
    pub demo: bool,
    pub api_url: Option<String>,
    pub stream_url: Option<String>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ClientConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientConfig", 6)?;
        state.serialize_field("user_id", "[REDACTED]")?;
        state.serialize_field("password", "[REDACTED]")?;
        state.serialize_field("app_name", &self.app_name)?;
        state.serialize_field("demo", &self.demo)?;
        state.serialize_field("api_url", &self.api_url)?;
        state.serialize_field("stream_url", &self.stream_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ClientConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ClientConfigHelper {
            user_id: String,
            password: String,
            #[serde(default)]
            app_name: Option<String>,
            #[serde(default)]
            demo: bool,
            api_url: Option<String>,
            stream_url: Option<String>,
        }

        let helper = ClientConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            user_id: Secret::new(helper.user_id),
            password: Secret::new(helper.password),
            app_name: helper
                .app_name
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            demo: helper.demo,
            api_url: helper.api_url,
            stream_url: helper.stream_url,
        })
    }
}

impl ClientConfig {
    /// Create a new configuration for the real account environment
    #[must_use]
    pub fn new(user_id: String, password: String) -> Self {
        Self {
            user_id: Secret::new(user_id),
            password: Secret::new(password),
            app_name: DEFAULT_APP_NAME.to_string(),
            demo: false,
            api_url: None,
            stream_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_USER_ID` (e.g., `XTB_USER_ID`)
    /// - `{PREFIX}_PASSWORD`
    /// - `{PREFIX}_APP_NAME` (optional)
    /// - `{PREFIX}_DEMO` (optional, defaults to false)
    /// - `{PREFIX}_API_URL` / `{PREFIX}_STREAM_URL` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let user_id_var = format!("{}_USER_ID", prefix);
        let password_var = format!("{}_PASSWORD", prefix);

        let user_id = env::var(&user_id_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(user_id_var))?;

        let password = env::var(&password_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(password_var))?;

        let demo_var = format!("{}_DEMO", prefix);
        let demo = match env::var(&demo_var) {
            Ok(value) => value.parse::<bool>().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "{} must be true or false, got '{}'",
                    demo_var, value
                ))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            user_id: Secret::new(user_id),
            password: Secret::new(password),
            app_name: env::var(format!("{}_APP_NAME", prefix))
                .unwrap_or_else(|_| DEFAULT_APP_NAME.to_string()),
            demo,
            api_url: env::var(format!("{}_API_URL", prefix)).ok(),
            stream_url: env::var(format!("{}_STREAM_URL", prefix)).ok(),
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Check if this configuration carries credentials usable for `login`
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.user_id.expose_secret().is_empty() && !self.password.expose_secret().is_empty()
    }

    /// Target the demo environment
    #[must_use]
    pub const fn demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Override the request/response endpoint
    #[must_use]
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Override the streaming endpoint
    #[must_use]
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    /// Get user id (use carefully - exposes secret)
    pub fn user_id(&self) -> &str {
        self.user_id.expose_secret()
    }

    /// Get password (use carefully - exposes secret)
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Options for the call channel, honouring any url override
    pub fn api_options(&self) -> ApiOptions {
        let base = if self.demo {
            ApiOptions::demo()
        } else {
            ApiOptions::real()
        };
        match &self.api_url {
            Some(url) => base.with_url(url.clone()),
            None => base,
        }
    }

    /// Options for the stream channel, honouring any url override
    pub fn stream_options(&self) -> StreamOptions {
        let base = if self.demo {
            StreamOptions::demo()
        } else {
            StreamOptions::real()
        };
        match &self.stream_url {
            Some(url) => base.with_url(url.clone()),
            None => base,
        }
    }
}

/// Settings consumed by the request/response client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiOptions {
    pub url: String,
    pub connect_timeout: Duration,
    /// Deadline for one send + matching receive
    pub call_timeout: Duration,
}

impl ApiOptions {
    pub fn real() -> Self {
        Self {
            url: REAL_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_millis(250),
        }
    }

    pub fn demo() -> Self {
        Self {
            url: DEMO_API_URL.to_string(),
            ..Self::real()
        }
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self::real()
    }
}

/// Settings consumed by the stream dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub url: String,
    pub connect_timeout: Duration,
    /// Timeout for a single stream command write
    pub write_timeout: Duration,
    /// Interval between liveness pings while listening
    pub keep_alive_interval: Duration,
    /// Capacity of queues handed out by `subscribe_channel`
    pub incoming_buffer_size: usize,
}

impl StreamOptions {
    pub fn real() -> Self {
        Self {
            url: REAL_STREAM_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_millis(500),
            keep_alive_interval: Duration::from_secs(10),
            incoming_buffer_size: 10,
        }
    }

    pub fn demo() -> Self {
        Self {
            url: DEMO_STREAM_URL.to_string(),
            ..Self::real()
        }
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub const fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub const fn with_incoming_buffer_size(mut self, size: usize) -> Self {
        self.incoming_buffer_size = size;
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::real()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
