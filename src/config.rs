use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared immutably via FromRef, so every extractor and middleware sees the same values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    // Runtime environment marker. Controls cookie hardening, log format and error detail.
    pub env: Env,
    // HMAC secret used to sign and verify bearer tokens.
    pub jwt_secret: String,
    // Token validity window, in days.
    pub jwt_expires_in_days: i64,
    // Lifetime of the `jwt` and `sid` cookies (and the server session), in days.
    pub jwt_cookie_expires_in_days: i64,
    // bcrypt work factor.
    pub bcrypt_cost: u32,
    pub port: u16,
}

/// Env
///
/// The runtime context: relaxed local development versus hardened production.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_EXPIRES_IN_DAYS: i64 = 90;
const DEFAULT_BCRYPT_COST: u32 = 10;
const DEFAULT_PORT: u16 = 3000;

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking values for test state setup: local mode, no database,
    /// and the cheapest bcrypt cost so hashing stays fast under test.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_expires_in_days: DEFAULT_EXPIRES_IN_DAYS,
            jwt_cookie_expires_in_days: DEFAULT_EXPIRES_IN_DAYS,
            bcrypt_cost: 4,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and implements the **fail-fast**
    /// principle for production secrets.
    ///
    /// # Panics
    /// Panics if `JWT_SECRET` or `DATABASE_URL` is missing while `APP_ENV=production`,
    /// or if a numeric variable is set but unparsable.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (jwt_secret, db_url) = match env {
            Env::Production => (
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
            ),
            Env::Local => (
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            ),
        };

        let bcrypt_cost = numeric_var("BCRYPT_COST", DEFAULT_BCRYPT_COST);
        assert!(
            (4..=31).contains(&bcrypt_cost),
            "FATAL: BCRYPT_COST must be between 4 and 31."
        );

        Self {
            db_url,
            env,
            jwt_secret,
            jwt_expires_in_days: numeric_var("JWT_EXPIRES_IN", DEFAULT_EXPIRES_IN_DAYS),
            jwt_cookie_expires_in_days: numeric_var(
                "JWT_COOKIE_EXPIRES_IN",
                DEFAULT_EXPIRES_IN_DAYS,
            ),
            bcrypt_cost,
            port: numeric_var("PORT", DEFAULT_PORT),
        }
    }
}

fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .trim_end_matches('d')
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be numeric, got `{raw}`.")),
        Err(_) => default,
    }
}
