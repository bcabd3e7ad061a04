pub mod schema;

pub use schema::{
    BackendsConfig, Config, EssayConfig, GatewayConfig, LineConfig, ProviderConfig,
    RestaurantConfig, SessionsConfig, YoutubeConfig,
};

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    if value.len() <= 4 {
        "***".to_string()
    } else {
        format!("{}***", &value[..4])
    }
}
