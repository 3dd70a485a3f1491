use livechat::config::RelayConfig;
use livechat::relay::{self, RelayError, RelayState};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();
    relay::run(config.port, RelayState::new()).await
}
