use std::env;

/// Stripe credentials (cards and premium subscriptions).
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price ID of the premium subscription plan (price_xxx)
    pub premium_price_id: Option<String>,
    pub api_base: String,
}

/// AbacatePay credentials (PIX charges and payouts).
#[derive(Debug, Clone)]
pub struct AbacatePayConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub api_base: String,
}

/// Requests per minute for each rate limit tier.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Payment, verification and withdrawal endpoints
    pub strict_rpm: u32,
    /// Question, answer and ledger read endpoints
    pub standard_rpm: u32,
    /// Health check
    pub relaxed_rpm: u32,
    /// How often stale limiter keys are swept
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Firebase project used to verify bearer tokens. None = auth unavailable.
    pub firebase_project_id: Option<String>,
    pub stripe: Option<StripeConfig>,
    pub abacatepay: Option<AbacatePayConfig>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub rate_limit: RateLimitConfig,
}

/// Reads a variable, treating empty values as unset.
fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_or("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        // Both the API key and the webhook secret are required; a gateway with
        // only one of them is treated as not configured.
        let stripe = match (non_empty("STRIPE_SECRET_KEY"), non_empty("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
                premium_price_id: non_empty("STRIPE_PREMIUM_PRICE_ID"),
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!("Stripe partially configured; card payments disabled");
                None
            }
        };

        let abacatepay = match (
            non_empty("ABACATEPAY_API_KEY"),
            non_empty("ABACATEPAY_WEBHOOK_SECRET"),
        ) {
            (Some(api_key), Some(webhook_secret)) => Some(AbacatePayConfig {
                api_key,
                webhook_secret,
                api_base: env::var("ABACATEPAY_API_BASE")
                    .unwrap_or_else(|_| "https://api.abacatepay.com/v1".to_string()),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!("AbacatePay partially configured; PIX payments disabled");
                None
            }
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: parse_or("RATE_LIMIT_STRICT_RPM", defaults.strict_rpm).max(1),
            standard_rpm: parse_or("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm).max(1),
            relaxed_rpm: parse_or("RATE_LIMIT_RELAXED_RPM", defaults.relaxed_rpm).max(1),
            sweep_interval_secs: parse_or("RATE_LIMIT_SWEEP_SECS", defaults.sweep_interval_secs)
                .max(1),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "questiongo.db".to_string()),
            base_url,
            firebase_project_id: non_empty("FIREBASE_PROJECT_ID"),
            stripe,
            abacatepay,
            resend_api_key: non_empty("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "QuestionGo <noreply@questiongo.com.br>".to_string()),
            rate_limit,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
