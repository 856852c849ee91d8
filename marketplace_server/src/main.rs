use dotenvy::dotenv;
use env_logger::Env;
use log::info;
use marketplace_engine::helpers::IdGenerator;
use marketplace_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init_from_env(Env::new().filter_or("LOG_LEVEL", "info"));
    let config = ServerConfig::from_env_or_default();
    if let Err(e) = IdGenerator::init(config.machine_id) {
        eprintln!("Could not initialise the id generator: {e}");
        std::process::exit(1);
    }

    info!("🚀️ Starting marketplace server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}
