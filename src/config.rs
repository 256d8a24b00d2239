// src/config.rs

use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub client_origin: String,
    pub db_max_connections: u32,
}

impl Config {
    /// Reads the environment, after loading a `.env` file if one is present.
    pub fn load() -> Self {
        if dotenv::dotenv().is_ok() {
            info!("Loaded .env file");
        }

        Self {
            port: try_load("PORT", "5000"),
            database_url: var("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            client_origin: try_load("CLIENT_ORIGIN", "http://localhost:3000"),
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "5"),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    parse_or_default(key, var(key), default)
}

fn parse_or_default<T: FromStr>(key: &str, value: Option<String>, default: &str) -> T
where
    T::Err: Display,
{
    let raw = value.unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
                .parse()
                .map_err(|e| {
                    warn!("Invalid default for {key}: {e}");
                })
                .expect("Environment misconfigured!")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_uses_default() {
        let port: u16 = parse_or_default("PORT", None, "5000");
        assert_eq!(port, 5000);
    }

    #[test]
    fn invalid_value_falls_back_to_default() {
        let port: u16 = parse_or_default("PORT", Some("not-a-port".into()), "5000");
        assert_eq!(port, 5000);
    }

    #[test]
    fn valid_value_is_parsed() {
        let connections: u32 = parse_or_default("DB_MAX_CONNECTIONS", Some("12".into()), "5");
        assert_eq!(connections, 12);
    }
}
