use std::{env, io::Write};

use chrono::Duration;
use ed25519_dalek::{SigningKey, VerifyingKey};
use log::*;
use mps_common::Secret;
use rand::{thread_rng, RngCore};
use serde_json::json;
use stripe_tools::StripeConfig;
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_MPS_HOST: &str = "127.0.0.1";
const DEFAULT_MPS_PORT: u16 = 8240;
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
/// Pending orders older than this are swept by the scheduler.
const DEFAULT_ORDER_TTL: Duration = Duration::hours(24);
const DEFAULT_JWT_EXPIRY_SECS: i64 = 900;
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Disambiguates ID generators when several replicas share the database.
    pub machine_id: u8,
    /// The time before an unpaid pending order is considered abandoned and canceled.
    pub order_ttl: Duration,
    /// Maximum time to wait for a client to send the first request bytes.
    pub read_timeout: std::time::Duration,
    /// Maximum time to wait for a client to disconnect cleanly on shutdown.
    pub write_timeout: std::time::Duration,
    /// Keep-alive window for idle connections.
    pub idle_timeout: std::time::Duration,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPS_HOST.to_string(),
            port: DEFAULT_MPS_PORT,
            database_url: String::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            machine_id: 0,
            order_ttl: DEFAULT_ORDER_TTL,
            read_timeout: std::time::Duration::from_secs(5),
            write_timeout: std::time::Duration::from_secs(5),
            idle_timeout: std::time::Duration::from_secs(600),
            auth: AuthConfig::default(),
            stripe: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let (host, port) = configure_listen_address();
        let database_url = env::var("DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ DATABASE_URL is not set. Please set it to the URL for the marketplace database.");
            String::default()
        });
        let max_connections = env_or_default("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let machine_id = env_or_default("MACHINE_ID", 0u8);
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let stripe = StripeConfig::new_from_env_or_default();
        let read_timeout = std::time::Duration::from_secs(env_or_default("SERVER_READ_TIMEOUT", 5u64));
        let write_timeout = std::time::Duration::from_secs(env_or_default("SERVER_WRITE_TIMEOUT", 5u64));
        let idle_timeout = std::time::Duration::from_secs(env_or_default("SERVER_IDLE_TIMEOUT", 600u64));
        Self {
            host,
            port,
            database_url,
            max_connections,
            machine_id,
            order_ttl: DEFAULT_ORDER_TTL,
            read_timeout,
            write_timeout,
            idle_timeout,
            auth,
            stripe,
        }
    }
}

fn configure_listen_address() -> (String, u16) {
    let Ok(addr) = env::var("SERVER_ADDR") else {
        info!("🪛️ SERVER_ADDR is not set. Using the default, {DEFAULT_MPS_HOST}:{DEFAULT_MPS_PORT}.");
        return (DEFAULT_MPS_HOST.to_string(), DEFAULT_MPS_PORT);
    };
    match addr.rsplit_once(':').and_then(|(host, port)| port.parse::<u16>().ok().map(|p| (host.to_string(), p))) {
        Some((host, port)) if !host.is_empty() => (host, port),
        _ => {
            error!(
                "🪛️ {addr} is not a valid host:port pair for SERVER_ADDR. Using the default, \
                 {DEFAULT_MPS_HOST}:{DEFAULT_MPS_PORT}, instead."
            );
            (DEFAULT_MPS_HOST.to_string(), DEFAULT_MPS_PORT)
        },
    }
}

fn env_or_default<T: std::str::FromStr + std::fmt::Display + Copy>(var: &str, default: T) -> T
where T::Err: std::fmt::Display {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Ed25519 key used to sign access tokens. Supplied as a 32-byte hex seed in JWT_SIGNING_KEY.
    pub jwt_signing_key: SigningKey,
    /// The public key corresponding to `jwt_signing_key`, from JWT_VERIFICATION_KEY.
    pub jwt_verification_key: VerifyingKey,
    /// Key for the HMACs over refresh-token secrets and confirmation codes.
    pub hmac_secret: Secret<String>,
    pub access_token_expiry: Duration,
    pub refresh_token_expiry: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The JWT signing key has not been set. I'm using a random value for this session. DO NOT operate \
             on production like this since every issued token dies with the process. 🚨️🚨️🚨️"
        );
        let signing_key = SigningKey::generate(&mut thread_rng());
        let verification_key = signing_key.verifying_key();
        match &mut tmpfile {
            Some((f, p)) => {
                let key_data = json!({
                    "jwt_signing_key": hex::encode(signing_key.to_bytes()),
                    "jwt_verification_key": hex::encode(verification_key.to_bytes()),
                })
                .to_string();
                match writeln!(f, "{key_data}") {
                    Ok(()) => warn!(
                        "🚨️🚨️🚨️ The JWT signing key for this session was written to {}. If this is a production \
                         instance, you are doing it wrong! Set the JWT_SIGNING_KEY and JWT_VERIFICATION_KEY \
                         environment variables instead. 🚨️🚨️🚨️",
                        p.to_str().unwrap_or("???")
                    ),
                    Err(e) => warn!("🪛️ Could not write the JWT signing key to the temporary file. {e}"),
                }
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the JWT signing key.");
            },
        }
        Self {
            jwt_signing_key: signing_key,
            jwt_verification_key: verification_key,
            hmac_secret: Secret::new(random_hmac_secret()),
            access_token_expiry: Duration::seconds(DEFAULT_JWT_EXPIRY_SECS),
            refresh_token_expiry: Duration::days(DEFAULT_REFRESH_EXPIRY_DAYS),
        }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let sk_hex =
            env::var("JWT_SIGNING_KEY").map_err(|e| ServerError::ConfigurationError(format!("{e} [JWT_SIGNING_KEY]")))?;
        let vk_hex = env::var("JWT_VERIFICATION_KEY")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [JWT_VERIFICATION_KEY]")))?;
        let seed: [u8; 32] = hex::decode(&sk_hex)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                ServerError::ConfigurationError("JWT_SIGNING_KEY must be a 32-byte hex-encoded seed".to_string())
            })?;
        let signing_key = SigningKey::from_bytes(&seed);
        let vk_bytes: [u8; 32] = hex::decode(&vk_hex)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                ServerError::ConfigurationError("JWT_VERIFICATION_KEY must be a 32-byte hex-encoded key".to_string())
            })?;
        let verification_key = VerifyingKey::from_bytes(&vk_bytes)
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid key in JWT_VERIFICATION_KEY: {e}")))?;
        // Users specify both keys so that the public key is easy to share and look up; it must
        // still match the signing key.
        if verification_key != signing_key.verifying_key() {
            return Err(ServerError::ConfigurationError(
                "The verification key does not match the signing key. Check your configuration.".to_string(),
            ));
        }
        let hmac_secret = env::var("HMAC_SECRET").map(Secret::new).unwrap_or_else(|_| {
            warn!(
                "🚨️ HMAC_SECRET is not set. I'm using a random value for this session. Refresh tokens and \
                 confirmation codes issued earlier will stop verifying."
            );
            Secret::new(random_hmac_secret())
        });
        let access_token_expiry = Duration::seconds(env_or_default("JWT_EXPIRY", DEFAULT_JWT_EXPIRY_SECS));
        let refresh_token_expiry = Duration::days(env_or_default("REFRESH_EXPIRY", DEFAULT_REFRESH_EXPIRY_DAYS));
        Ok(Self { jwt_signing_key: signing_key, jwt_verification_key: verification_key, hmac_secret, access_token_expiry, refresh_token_expiry })
    }
}

fn random_hmac_secret() -> String {
    let mut bytes = [0u8; 32];
    thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
