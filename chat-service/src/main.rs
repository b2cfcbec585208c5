use chat_service::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    let state = AppState::from_config(config.clone()).await?;
    let app = router(state);

    tracing::info!(
        "Chat websocket available at ws://0.0.0.0:{}/ws",
        config.service.port
    );

    Server::new(config).serve(app).await?;

    Ok(())
}
