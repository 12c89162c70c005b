mod config;
mod errors;
mod handlers;
mod logging;
mod ops;
mod sandbox;
mod security;
mod server;


use crate::config::Config;
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("filegate.toml");
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() { eprintln!("--config requires a path"); std::process::exit(2); }
                config_path = PathBuf::from(&args[i]);
            }
            other => { eprintln!("unknown argument: {other}"); std::process::exit(2); }
        }
        i += 1;
    }

    let cfg = Config::load(&config_path).with_context(|| format!("loading config {}", config_path.display()))?;
    cfg.validate().context("validating config")?;
    logging::init(cfg.logging.format);
    cfg.prepare_root().context("preparing sandbox root")?;

    let guard = sandbox::PathGuard::new(&cfg.sandbox.root_dir).context("resolving sandbox root")?;
    let registry = ops::registry::Registry::new(&cfg).context("building operation registry")?;
    let addr = format!("{}:{}", cfg.server.bind_addr, cfg.server.port);

    info!(addr = %addr, root = %guard.root().display(), operations = ?registry.list_names(), "filegate ready");

    let dispatcher = ops::dispatch::Dispatcher::new(guard, registry);
    server::serve(server::AppState::new(cfg, dispatcher)).await
}
