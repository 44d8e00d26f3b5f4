use eyre::{bail, WrapErr};
use serde::Deserialize;
use std::path::Path;

/// Peer limit value meaning "not set".
pub const UNSET_PEERS_VALUE: i64 = -1;

/// Share of the aggregate peer limit reserved for outbound dials.
const DIAL_RATIO: f64 = 0.2;

const DEFAULT_MAX_PEERS: i64 = 40;

/// Node configuration as read from a `.json` or `.hcl` file. File values
/// override command-line flags when a config file is given.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    pub chain: String,
    pub data_dir: String,
    pub grpc_addr: String,
    pub libp2p_addr: String,
    pub nat_addr: String,
    pub dns_addr: String,
    pub no_discover: bool,
    pub max_peers: i64,
    pub max_inbound_peers: i64,
    pub max_outbound_peers: i64,
    pub price_limit: u64,
    pub max_slots: u64,
    pub block_time: u64,
    pub log_level: String,
    pub log_to: String,
    pub seal: bool,
    pub access_control_allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: "genesis.json".to_string(),
            data_dir: "data".to_string(),
            grpc_addr: "127.0.0.1:9632".to_string(),
            libp2p_addr: "127.0.0.1:1478".to_string(),
            nat_addr: String::new(),
            dns_addr: String::new(),
            no_discover: false,
            max_peers: UNSET_PEERS_VALUE,
            max_inbound_peers: UNSET_PEERS_VALUE,
            max_outbound_peers: UNSET_PEERS_VALUE,
            price_limit: 0,
            max_slots: 4096,
            block_time: 2,
            log_level: "info".to_string(),
            log_to: String::new(),
            seal: false,
            access_control_allow_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Reads a config file; the format follows the extension.
    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            Some("hcl") => hcl::from_str(&raw)?,
            _ => bail!("suffix of {} is neither hcl nor json", path.display()),
        };

        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.block_time < 1 {
            bail!("invalid block time specified, must be at least 1s");
        }
        if self.data_dir.is_empty() {
            bail!("data directory not defined");
        }
        if self.is_max_peers_set() && self.is_peer_range_set() {
            bail!("both max-peers and max-inbound/outbound flags are set");
        }
        Ok(())
    }

    fn is_max_peers_set(&self) -> bool {
        self.max_peers != UNSET_PEERS_VALUE
    }

    fn is_peer_range_set(&self) -> bool {
        self.max_inbound_peers != UNSET_PEERS_VALUE ||
            self.max_outbound_peers != UNSET_PEERS_VALUE
    }

    /// Resolves the aggregate/inbound/outbound peer limits.
    pub fn peer_limits(&self) -> (i64, i64, i64) {
        if self.is_peer_range_set() {
            let inbound = if self.max_inbound_peers == UNSET_PEERS_VALUE {
                DEFAULT_MAX_PEERS
            } else {
                self.max_inbound_peers
            };
            let outbound = if self.max_outbound_peers == UNSET_PEERS_VALUE {
                (DEFAULT_MAX_PEERS as f64 * DIAL_RATIO) as i64
            } else {
                self.max_outbound_peers
            };
            return (inbound + outbound, inbound, outbound);
        }

        let max = if self.is_max_peers_set() { self.max_peers } else { DEFAULT_MAX_PEERS };
        let outbound = (max as f64 * DIAL_RATIO).floor() as i64;
        (max, max - outbound, outbound)
    }
}
