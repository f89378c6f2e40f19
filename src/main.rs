use std::sync::Arc;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use glproxy::{server, ProxyClient, ProxyConfig};

#[tokio::main]
async fn main()
{   if let Err(e) = dotenvy::dotenv()
    {   if !e.not_found()
        {   eprintln!("Ignoring unreadable .env file: {}", e);
        }
    }
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = match ProxyConfig::load()
    {   Ok(config) => config
      , Err(e) => {
          error!("{}", e);
          std::process::exit(1);
        }
    };
    info!(
      "Upstream {} with fallbacks {:?}",
      config.upstream.base_url, config.models.fallbacks
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await
    {   Ok(listener) => listener
      , Err(e) => {
          error!("Cannot bind {}: {}", addr, e);
          std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
      match tokio::signal::ctrl_c().await
      {   Ok(()) => info!("Ctrl-C received, shutting down")
        , Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            return;
          }
      }
      shutdown.cancel();
    });

    let client = Arc::new(ProxyClient::new(config));
    if let Err(e) = server::serve(listener, client, cancel).await
    {   error!("Server error: {}", e);
        std::process::exit(1);
    }
}
