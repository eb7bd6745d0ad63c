use std::sync::Arc;

use colored::*;

use ironledger::broadcast::BroadcastQueue;
use ironledger::config::NodeConfig;
use ironledger::crypto::keys::Key;
use ironledger::mining::controller::{DifficultyFunction, MiningController};
use ironledger::mining::functions::MiningFunction;
use ironledger::mining::queue::MiningQueue;
use ironledger::net::client::{chain_sync_loop, peer_sync_loop, register_with_registry};
use ironledger::net::pool::PeerPool;
use ironledger::pool::TransactionPool;
use ironledger::rpc::server::{serve, RpcState};
use ironledger::storage::Storage;

fn banner() {
    println!("{}", " _____                    _              _            ".bright_cyan());
    println!("{}", "|_   _|                  | |            | |           ".bright_cyan());
    println!("{}", "  | |  _ __ ___  _ __     | | ___  __  __| | __ _  ___ ".bright_cyan().bold());
    println!("{}", "  | | | '__/ _ \\| '_ \\    | |/ _ \\/ _` | |/ _` |/ _ \\".bright_cyan().bold());
    println!("{}", " _| |_| | | (_) | | | |   | |  __/ (_| | | (_| |  __/  ".blue());
    println!("{}", "|_____|_|  \\___/|_| |_|   |_|\\___|\\__,_|_|\\__, |\\___|".blue());
    println!("{}", "                                           __/ |      ".blue());
    println!("{}", "                                          |___/       ".blue());
    println!();
    println!("{}", "              proof-of-work node              ".bright_green().on_black().bold());
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    banner();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "ironledger.yaml".to_string());
    let config = NodeConfig::load(&config_path).unwrap_or_else(|err| {
        println!("{} {err}, using defaults", "[config]".bright_yellow().bold());
        NodeConfig::default()
    });

    let key = Key::generate(config.curve);
    println!("{} address: {}", "[init]".bright_blue().bold(), key.to_address());

    let storage = Arc::new(Storage::new(config.curve));
    let pool = Arc::new(TransactionPool::new(storage.balance_handle()));
    let peers = Arc::new(PeerPool::new(config.max_neighbors));
    let broadcast = Arc::new(BroadcastQueue::new(peers.clone(), config.broadcast_queue_len as u32));

    let mining_function = if config.mining_threads > 1 {
        MiningFunction::Multi { threads: config.mining_threads }
    } else {
        MiningFunction::Single
    };
    let (mining_queue, finished_rx) = MiningQueue::new(storage.clone(), broadcast.clone(), mining_function);
    let (controller, preempt_tx) = MiningController::new(
        storage.clone(),
        pool.clone(),
        Arc::new(mining_queue),
        key.clone(),
        DifficultyFunction::Basic { target_interval_secs: config.mining_interval as i64 },
        233,
        config.mining_capacity,
    );
    storage.set_mining_cancel(move || {
        let _ = preempt_tx.try_send(());
    });
    tokio::spawn(controller.run(finished_rx));
    println!("{} mining controller started ({} threads)", "[mining]".bright_magenta().bold(), config.mining_threads);

    let self_address = format!("127.0.0.1:{}", config.listener_port);
    if !config.local_mode {
        let _ = register_with_registry(&config.register_address, &self_address).await;
        tokio::spawn(peer_sync_loop(
            config.register_address.clone(),
            self_address.clone(),
            peers.clone(),
            std::time::Duration::from_secs(config.update_time_base),
        ));
        tokio::spawn(chain_sync_loop(peers.clone(), storage.clone(), std::time::Duration::from_secs(config.update_time_base)));
        println!("{} registered with {}", "[net]".bright_green().bold(), config.register_address);
    }

    let rpc_state = Arc::new(RpcState {
        storage: storage.clone(),
        pool: pool.clone(),
        broadcast: broadcast.clone(),
        curve: config.curve,
    });

    println!("{} RPC listening on {}", "[rpc]".bright_cyan().bold(), self_address);
    serve(self_address.parse()?, rpc_state).await?;
    Ok(())
}
