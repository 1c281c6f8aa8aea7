use clap::Parser;
use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use roster::config::{self, ServerArgs};
use roster::procedures;
use roster::reconciler::TagSchema;
use roster::remote::api;
use roster::RosterDb;

fn main() {
    let args = ServerArgs::parse();
    config::init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("could not start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        tracing::error!(error = %e, "backend stopped");
        std::process::exit(1);
    }
}

fn load_seed(db: &RosterDb, path: &Path) -> Result<usize, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let snapshot: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(db.restore(&snapshot)?)
}

fn write_seed(db: &RosterDb, path: &Path) -> Result<(), Box<dyn Error>> {
    let snapshot = db.snapshot()?;
    std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
    Ok(())
}

async fn async_main(args: ServerArgs) -> Result<(), Box<dyn Error>> {
    let schema = TagSchema::default();
    let db = Arc::new(RosterDb::new());

    if args.no_procedures {
        procedures::install_tables(&db, &schema)?;
    } else {
        procedures::install(&db, &schema)?;
    }

    if let Some(seed) = args.seed.as_deref().filter(|p| p.exists()) {
        let rows = load_seed(&db, seed)?;
        tracing::info!(path = %seed.display(), rows, "loaded seed");
    }

    let addr: SocketAddr = args.addr.parse()?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let (bound, server) = api::serve(db.clone(), addr, shutdown)?;
    tracing::info!(addr = %bound, procedures = !args.no_procedures, "roster backend listening");

    server.await;
    tracing::info!("shutting down");

    if let Some(seed) = &args.seed {
        write_seed(&db, seed)?;
        tracing::info!(path = %seed.display(), "wrote snapshot");
    }
    Ok(())
}
