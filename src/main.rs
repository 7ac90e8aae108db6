use zedis::config::Config;
use zedis::run_server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    run_server(config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        log::info!("shutting down");
    })
    .await
}
