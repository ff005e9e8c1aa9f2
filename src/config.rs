use crate::domain::swap::PostId;
use crate::domain::user::{UserId, UserProfile};
use crate::error::Result;
use crate::infrastructure::stripe::StripeSettings;
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for `skillswap serve`. Every flag can also come from the
/// environment (a `.env` file is read first).
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// JSON array of `{id, name, email, role}` known to the user directory.
    #[arg(long, env = "USERS_FILE")]
    pub users_file: Option<PathBuf>,

    /// JSON array of `{id, ownerId}` for posts that can receive swap requests.
    #[arg(long, env = "POSTS_FILE")]
    pub posts_file: Option<PathBuf>,

    #[arg(long, env = "STRIPE_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub stripe_secret_key: String,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub stripe_webhook_secret: String,

    #[arg(
        long,
        env = "CHECKOUT_SUCCESS_URL",
        default_value = "http://localhost:5173/payment/success"
    )]
    pub checkout_success_url: String,

    #[arg(
        long,
        env = "CHECKOUT_CANCEL_URL",
        default_value = "http://localhost:5173/payment/cancel"
    )]
    pub checkout_cancel_url: String,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Upper bound on any single call to the payment provider.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 10)]
    pub provider_timeout_secs: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stripe_settings(&self) -> StripeSettings {
        StripeSettings {
            secret_key: self.stripe_secret_key.clone(),
            webhook_secret: self.stripe_webhook_secret.clone(),
            success_url: self.checkout_success_url.clone(),
            cancel_url: self.checkout_cancel_url.clone(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: PostId,
    pub owner_id: UserId,
}

pub fn load_users(path: &Path) -> Result<Vec<UserProfile>> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

pub fn load_posts(path: &Path) -> Result<Vec<PostRecord>> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}
