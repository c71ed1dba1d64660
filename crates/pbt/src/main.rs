use std::sync::Arc;

use pbt_core::{config::Config, context::AppContext, provider::ProviderRegistry};
use pbt_osu::OsuClient;
use pbt_quaver::QuaverClient;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), pbt_core::Error> {
    pbt_core::logging::init("pbt")?;

    let (cfg, store) = Config::load()?;

    let mut providers = ProviderRegistry::new().with(Arc::new(QuaverClient::new(cfg.http_timeout)?));
    match &cfg.osu_api_key {
        Some(key) => {
            providers = providers.with(Arc::new(OsuClient::new(key.clone(), cfg.http_timeout)?));
        }
        None => warn!("OSU_API_KEY is not set, osu! modes are disabled"),
    }

    let ctx = Arc::new(AppContext::new(cfg, store, Arc::new(providers)));
    ctx.bootstrap().await;

    pbt_telegram::router::run_polling(ctx)
        .await
        .map_err(|e| pbt_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
