// src/config.rs
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

/// 启动时从环境变量 (以及 .env) 读取一次
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expires_hours: i64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub demo_seed: Option<DemoSeed>,
}

/// SEED_DEMO_DATA=true 时写入的演示数据: 一个班级、收费标准、一名任课教师
#[derive(Clone, Debug)]
pub struct DemoSeed {
    pub teacher_email: String,
    pub teacher_password: String,
}

/// 空库时自动创建的管理员账号
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 便于测试: 通过闭包注入变量来源
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let host = parse_or(&lookup, "HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;
        let jwt_expires_hours = parse_or(&lookup, "JWT_EXPIRES_HOURS", 168i64)?;
        if jwt_expires_hours <= 0 {
            return Err(ConfigError::Invalid(
                "JWT_EXPIRES_HOURS",
                jwt_expires_hours.to_string(),
            ));
        }

        let bootstrap_admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    email,
                    password,
                    name: lookup("ADMIN_NAME").unwrap_or_else(|| "Admin User".to_string()),
                })
            }
            _ => None,
        };

        let demo_seed = parse_or(&lookup, "SEED_DEMO_DATA", false)?.then(|| DemoSeed {
            teacher_email: lookup("DEMO_TEACHER_EMAIL").unwrap_or_else(|| "teacher1@school.com".to_string()),
            teacher_password: lookup("DEMO_TEACHER_PASSWORD").unwrap_or_else(|| "password123".to_string()),
        });

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            jwt_secret,
            jwt_expires_hours,
            bootstrap_admin,
            demo_seed,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_values_are_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.jwt_expires_hours, 168);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:3000");
        assert!(config.bootstrap_admin.is_none());
        assert!(config.demo_seed.is_none());
    }

    #[test]
    fn demo_seed_is_opt_in() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
            ("SEED_DEMO_DATA", "true"),
        ]))
        .unwrap();
        let seed = config.demo_seed.unwrap();
        assert_eq!(seed.teacher_email, "teacher1@school.com");
        assert_eq!(seed.teacher_password, "password123");

        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
            ("SEED_DEMO_DATA", "yes please"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("SEED_DEMO_DATA", _)));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn unparsable_port_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("PORT", _)));
    }

    #[test]
    fn bootstrap_admin_requires_email_and_password() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
            ("ADMIN_EMAIL", "admin@school.com"),
        ]))
        .unwrap();
        assert!(config.bootstrap_admin.is_none());

        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("JWT_SECRET", "s3cret"),
            ("ADMIN_EMAIL", "admin@school.com"),
            ("ADMIN_PASSWORD", "password123"),
        ]))
        .unwrap();
        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "admin@school.com");
        assert_eq!(admin.name, "Admin User");
    }
}
