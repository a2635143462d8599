use actix_cors::Cors;
use actix_web::http::header::HeaderName;
use actix_web::http::{Method, Uri};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which origins / methods / headers a CORS rule admits.
#[derive(Debug, Clone, PartialEq)]
pub enum AllowList<T> {
    Any,
    Only(Vec<T>),
}

impl<T> AllowList<T> {
    /// Comma-separated entries; `*` anywhere (or nothing at all) admits everything.
    fn parse<F>(key: &'static str, raw: &str, item: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        let entries: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if entries.is_empty() || entries.contains(&"*") {
            return Ok(AllowList::Any);
        }
        entries
            .into_iter()
            .map(|entry| {
                item(entry).map_err(|reason| ConfigError::Invalid {
                    key,
                    value: entry.to_string(),
                    reason,
                })
            })
            .collect::<Result<Vec<T>, ConfigError>>()
            .map(AllowList::Only)
    }
}

fn parse_origin(raw: &str) -> Result<String, String> {
    let uri = Uri::try_from(raw).map_err(|e| e.to_string())?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err("expected an origin like https://host[:port]".to_string());
    }
    Ok(raw.to_string())
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_str(&raw.to_ascii_uppercase()).map_err(|e| e.to_string())
}

fn parse_header(raw: &str) -> Result<HeaderName, String> {
    HeaderName::from_str(raw).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorsConfig {
    pub allowed_origins: AllowList<String>,
    pub allowed_methods: AllowList<Method>,
    pub allowed_headers: AllowList<HeaderName>,
    pub allow_credentials: bool,
    pub max_age: Option<usize>,
}

impl Default for CorsConfig {
    /// Fully open: any origin, method and header, credentials allowed.
    fn default() -> Self {
        CorsConfig {
            allowed_origins: AllowList::Any,
            allowed_methods: AllowList::Any,
            allowed_headers: AllowList::Any,
            allow_credentials: true,
            max_age: None,
        }
    }
}

impl CorsConfig {
    pub fn build(&self) -> Cors {
        let mut cors = Cors::default();

        cors = match &self.allowed_origins {
            AllowList::Any => cors.allow_any_origin(),
            AllowList::Only(origins) => origins
                .iter()
                .fold(cors, |cors, origin| cors.allowed_origin(origin)),
        };
        cors = match &self.allowed_methods {
            AllowList::Any => cors.allow_any_method(),
            AllowList::Only(methods) => cors.allowed_methods(methods.iter().cloned()),
        };
        cors = match &self.allowed_headers {
            AllowList::Any => cors.allow_any_header(),
            AllowList::Only(headers) => cors.allowed_headers(headers.iter().cloned()),
        };
        if self.allow_credentials {
            cors = cors.supports_credentials();
        }
        if let Some(secs) = self.max_age {
            cors = cors.max_age(secs);
        }
        cors
    }
}

/// Process configuration, read from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    pub model_cache: bool,
    pub json_limit: usize,
    pub cors: CorsConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = match lookup("WORKERS") {
            Some(raw) => parse::<usize>("WORKERS", &raw)?,
            None => num_cpus::get(),
        };
        if workers == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKERS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let raw = |key: &str| lookup(key).unwrap_or_default();
        let cors = CorsConfig {
            allowed_origins: AllowList::parse(
                "CORS_ALLOWED_ORIGINS",
                &raw("CORS_ALLOWED_ORIGINS"),
                parse_origin,
            )?,
            allowed_methods: AllowList::parse(
                "CORS_ALLOWED_METHODS",
                &raw("CORS_ALLOWED_METHODS"),
                parse_method,
            )?,
            allowed_headers: AllowList::parse(
                "CORS_ALLOWED_HEADERS",
                &raw("CORS_ALLOWED_HEADERS"),
                parse_header,
            )?,
            allow_credentials: match lookup("CORS_ALLOW_CREDENTIALS") {
                Some(raw) => parse_bool("CORS_ALLOW_CREDENTIALS", &raw)?,
                None => true,
            },
            max_age: lookup("CORS_MAX_AGE")
                .map(|raw| parse::<usize>("CORS_MAX_AGE", &raw))
                .transpose()?,
        };

        Ok(ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: match lookup("PORT") {
                Some(raw) => parse::<u16>("PORT", &raw)?,
                None => 8000,
            },
            workers,
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("model.onnx")),
            model_cache: match lookup("MODEL_CACHE") {
                Some(raw) => parse_bool("MODEL_CACHE", &raw)?,
                None => false,
            },
            json_limit: match lookup("JSON_LIMIT") {
                Some(raw) => parse::<usize>("JSON_LIMIT", &raw)?,
                None => 64 * 1024,
            },
            cors,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
