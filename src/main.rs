use cut_it_now::api;
use cut_it_now::config::AppConfig;

#[tokio::main]
async fn main() {
    // .env may carry RUST_LOG, so load it before the logger
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = dotenv {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            log::warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let api_config = app_config.api.clone();
    let optimizer_config = app_config.optimizer.clone();

    println!("✂️ Cutting service starting...");
    if let Err(err) = api::start_api_server(api_config, optimizer_config).await {
        log::error!("API server terminated with an error: {}", err);
        std::process::exit(1);
    }
}
