use crate::config::{Config, UNSET_PEERS_VALUE};
use clap::Args;
use dogesync_blockchain::Blockchain;
use dogesync_chainspec::ChainSpec;
use dogesync_kvdb::MdbxDb;
use dogesync_network::{InProcessNetwork, Network};
use dogesync_rpc::EthApiImpl;
use dogesync_state::Executor;
use dogesync_sync::{SyncService, Syncer};
use dogesync_trie::{KvTrieStorage, State};
use eyre::WrapErr;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the sync loop re-evaluates the best peer.
const SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Path to a .json or .hcl config file; file values override flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the genesis chain file.
    #[arg(long, default_value = "genesis.json")]
    pub chain: String,

    /// Data directory for the blockchain store and the network identity.
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// gRPC service address.
    #[arg(long, default_value = "127.0.0.1:9632")]
    pub grpc_address: String,

    /// libp2p listen address.
    #[arg(long, default_value = "127.0.0.1:1478")]
    pub libp2p: String,

    /// External NAT address (ip:port).
    #[arg(long, default_value = "")]
    pub nat: String,

    /// DNS host the node advertises.
    #[arg(long, default_value = "")]
    pub dns: String,

    /// Disables peer discovery.
    #[arg(long)]
    pub no_discover: bool,

    /// Aggregate peer limit; mutually exclusive with the in/out limits.
    #[arg(long, default_value_t = UNSET_PEERS_VALUE)]
    pub max_peers: i64,

    #[arg(long, default_value_t = UNSET_PEERS_VALUE)]
    pub max_inbound_peers: i64,

    #[arg(long, default_value_t = UNSET_PEERS_VALUE)]
    pub max_outbound_peers: i64,

    /// Minimum gas price the mempool accepts.
    #[arg(long, default_value_t = 0)]
    pub price_limit: u64,

    /// Mempool slot limit.
    #[arg(long, default_value_t = 4096)]
    pub max_slots: u64,

    /// Target block time in seconds (>= 1).
    #[arg(long, default_value_t = 2)]
    pub block_time: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file location; stderr when empty.
    #[arg(long, default_value = "")]
    pub log_to: String,

    /// Seal blocks (this build only validates; the flag is kept for config
    /// compatibility).
    #[arg(long)]
    pub seal: bool,

    #[arg(long = "access-control-allow-origins", default_value = "*")]
    pub access_control_allow_origins: Vec<String>,
}

impl ServerArgs {
    /// The effective configuration: the config file, when given, overrides
    /// the flags.
    fn into_config(self) -> eyre::Result<Config> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config {
                chain: self.chain,
                data_dir: self.data_dir,
                grpc_addr: self.grpc_address,
                libp2p_addr: self.libp2p,
                nat_addr: self.nat,
                dns_addr: self.dns,
                no_discover: self.no_discover,
                max_peers: self.max_peers,
                max_inbound_peers: self.max_inbound_peers,
                max_outbound_peers: self.max_outbound_peers,
                price_limit: self.price_limit,
                max_slots: self.max_slots,
                block_time: self.block_time,
                log_level: self.log_level,
                log_to: self.log_to,
                seal: self.seal,
                access_control_allow_origins: self.access_control_allow_origins,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

pub fn run(args: ServerArgs) -> eyre::Result<()> {
    let config = args.into_config()?;
    init_logs(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build the runtime")?;

    runtime.block_on(run_node(config))
}

fn init_logs(config: &Config) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("default filter is valid");

    if config.log_to.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_to)
            .wrap_err_with(|| format!("failed to open log file {}", config.log_to))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .init();
    }
    Ok(())
}

async fn run_node(config: Config) -> eyre::Result<()> {
    let spec = Arc::new(
        ChainSpec::import(&config.chain)
            .wrap_err_with(|| format!("failed to import chain {}", config.chain))?,
    );
    info!(chain = %spec.name, chain_id = spec.chain_id(), "starting dogesync");

    let data_dir = PathBuf::from(&config.data_dir);
    std::fs::create_dir_all(data_dir.join("blockchain"))?;
    std::fs::create_dir_all(data_dir.join("libp2p"))?;

    let db: Arc<dyn dogesync_kvdb::Database> = Arc::new(
        MdbxDb::open(&data_dir.join("blockchain")).wrap_err("failed to open the chain store")?,
    );

    let state = Arc::new(State::new(Arc::new(KvTrieStorage::new(Arc::clone(&db)))));
    let executor = Arc::new(Executor::new(&spec.params, Arc::clone(&state)));
    let blockchain =
        Blockchain::new(Arc::clone(&spec), db, Arc::clone(&state), Arc::clone(&executor));

    blockchain.handle_genesis().wrap_err("failed to initialize the chain")?;

    // the libp2p transport attaches peers to this registry; see the network
    // crate docs for the integration seam
    let (max_peers, inbound, outbound) = config.peer_limits();
    info!(max_peers, inbound, outbound, no_discover = config.no_discover, "network limits");
    let network = InProcessNetwork::new();

    let syncer = Syncer::new(Arc::clone(&blockchain), Arc::clone(&network) as Arc<dyn Network>);
    syncer.start().await;
    let _service = SyncService::new(Arc::clone(&blockchain), Arc::clone(&syncer));

    let rpc_addr = config
        .grpc_addr
        .parse()
        .wrap_err_with(|| format!("failed to parse addr '{}'", config.grpc_addr))?;
    let _rpc_handle = dogesync_rpc::start_rpc_server(
        rpc_addr,
        &config.access_control_allow_origins,
        EthApiImpl::new(Arc::clone(&blockchain), state),
    )
    .await?;

    // the active control loop: keep pulling from the best peer until told to
    // stop
    let sync_loop = {
        let syncer = Arc::clone(&syncer);
        tokio::spawn(async move {
            loop {
                let Some(best) = syncer.best_peer() else {
                    tokio::time::sleep(SYNC_RETRY_INTERVAL).await;
                    continue;
                };

                let peer = best.id();
                if let Err(err) = syncer.bulk_sync_with_peer(Arc::clone(&best)).await {
                    warn!(%peer, %err, "bulk sync ended");
                    tokio::time::sleep(SYNC_RETRY_INTERVAL).await;
                    continue;
                }

                // follow the peer's announcements until it goes quiet
                if let Err(err) = syncer.watch_sync_with_peer(best).await {
                    info!(%peer, %err, "watch sync ended, rotating peers");
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    syncer.stop();
    sync_loop.abort();
    if let Err(err) = blockchain.close() {
        error!(%err, "failed to close the blockchain cleanly");
    }

    Ok(())
}
