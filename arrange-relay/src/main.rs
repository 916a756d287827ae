use std::fs::File;
use std::thread;
use std::time::Duration;

use arrange_sync::relay::RelayServer;
use arrange_sync::SyncConfig;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("arrange")
        .join("relay.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let created = File::create(&log_path).or_else(|_| File::create("/tmp/arrange-relay.log"));
    let log_file = match created {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, Config::default(), log_file) {
        eprintln!("Failed to initialize logger: {}", e);
        return;
    }

    log::info!("arrange-relay starting (log level: {:?})", log_level);
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = SyncConfig::load();
    let bind = args
        .iter()
        .position(|a| a == "--bind")
        .and_then(|i| args.get(i + 1).cloned())
        .unwrap_or_else(|| config.relay_bind().to_string());

    let mut server = RelayServer::bind(&bind)?;
    log::info!("Relay listening on {}", server.local_addr()?);
    eprintln!("arrange-relay listening on {}", bind);

    let mut last_client_count = 0usize;
    loop {
        server.accept_connections();
        server.poll();

        let count = server.client_count();
        if count != last_client_count {
            log::info!(
                "{} {} connected",
                count,
                if count == 1 { "client" } else { "clients" }
            );
            last_client_count = count;
        }

        thread::sleep(Duration::from_millis(5));
    }
}
