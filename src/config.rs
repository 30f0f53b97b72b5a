const PLACEHOLDER_JWT_SECRET: &str = "CHANGE_ME_JWT_SECRET";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// When set, real-time fan-out is bridged across processes over Redis pub/sub.
    pub redis_url: Option<String>,
    /// Pub/sub channel used by the fan-out bridge.
    pub fanout_channel: String,
    /// HS256 secret shared with the platform's auth service.
    pub jwt_secret: String,
    /// Guards the internal event endpoints. Unset = internal API refuses all calls.
    pub admin_key: Option<String>,
    /// Push gateway endpoint. Unset = push fallback disabled.
    pub push_url: Option<String>,
    /// Optional HMAC secret for signing push gateway requests.
    pub push_secret: Option<String>,
    /// Seconds a fresh socket may stay unauthenticated before it is closed.
    pub auth_timeout_secs: u64,
    /// Interval of the expired-notification sweeper.
    pub expiry_sweep_secs: u64,
    /// Allowed browser origin for CORS.
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/matchnotify".into(),
            redis_url: None,
            fanout_channel: "matchnotify:fanout".into(),
            jwt_secret: PLACEHOLDER_JWT_SECRET.into(),
            admin_key: None,
            push_url: None,
            push_secret: None,
            auth_timeout_secs: 30,
            expiry_sweep_secs: 3600,
            cors_origin: "http://localhost:3000".into(),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    let defaults = Config::default();

    let jwt_secret =
        std::env::var("MATCHNOTIFY_JWT_SECRET").unwrap_or_else(|_| PLACEHOLDER_JWT_SECRET.into());

    if jwt_secret == PLACEHOLDER_JWT_SECRET {
        let env_mode = std::env::var("MATCHNOTIFY_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "MATCHNOTIFY_JWT_SECRET is still the insecure placeholder. \
                 Set the secret shared with the auth service before running in production."
            );
        }
        tracing::warn!("MATCHNOTIFY_JWT_SECRET is not set; using insecure placeholder");
    }

    Ok(Config {
        port: env_parse("MATCHNOTIFY_PORT").unwrap_or(defaults.port),
        database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        redis_url: env_opt("MATCHNOTIFY_REDIS_URL"),
        fanout_channel: std::env::var("MATCHNOTIFY_FANOUT_CHANNEL")
            .unwrap_or(defaults.fanout_channel),
        jwt_secret,
        admin_key: env_opt("MATCHNOTIFY_ADMIN_KEY"),
        push_url: env_opt("MATCHNOTIFY_PUSH_URL"),
        push_secret: env_opt("MATCHNOTIFY_PUSH_SECRET"),
        auth_timeout_secs: env_parse("MATCHNOTIFY_AUTH_TIMEOUT_SECS")
            .unwrap_or(defaults.auth_timeout_secs),
        expiry_sweep_secs: env_parse("MATCHNOTIFY_EXPIRY_SWEEP_SECS")
            .unwrap_or(defaults.expiry_sweep_secs),
        cors_origin: std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
    })
}

/// Set and non-empty.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
