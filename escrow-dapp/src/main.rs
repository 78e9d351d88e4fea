use dotenv::dotenv;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use escrow_dapp::console::{self, Command};
use escrow_dapp::contract::{EscrowArtifact, EthersEscrowDeployer, EvmRpc};
use escrow_dapp::{wallet, Config, EscrowApp};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> escrow_dapp::Result<()> {
    let config = Config::from_env()?;

    log::info!("Connecting to {} (chain {})", config.rpc_url, config.chain_id);
    let rpc = Arc::new(EvmRpc::new(
        &config.rpc_url,
        config.timings.receipt_poll_interval,
    )?);

    log::info!("Loading escrow artifact from {}", config.artifact_path.display());
    let artifact = EscrowArtifact::load(&config.artifact_path)?;
    let deployer = Arc::new(EthersEscrowDeployer::new(rpc, artifact));

    let session = wallet::create_wallet_session(&config)?;
    let app = Arc::new(EscrowApp::new(session, deployer, config.timings));
    let account = app.connect().await?;
    println!("Connected as {}", account);
    println!("{}", console::help_text());

    // Re-render on every published snapshot
    let mut snapshots = app.subscribe();
    let renderer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            println!("\n{}", console::render(&snapshot));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(cmd) = console::parse(&line) else {
            println!("Unknown command. Type `help` for the list.");
            continue;
        };
        if cmd == Command::Quit {
            break;
        }
        match console::execute(cmd, &app).await {
            Ok(output) => println!("{}", output),
            Err(e) => println!("✗ {}", e),
        }
    }

    app.shutdown();
    renderer.abort();
    log::info!("Bye");
    Ok(())
}
