use crate::{
    gateway::GatewaySettings, lifecycle::LifecycleSettings, transaction::TransactionSettings,
};
use clap::Parser;
use fabric_common::{
    chaincode::ChaincodeDescriptor,
    config::{
        DEFAULT_CHAINCODE_BASE_DIR, DEFAULT_COMMIT_WAIT_TIME, DEFAULT_PROPOSAL_WAIT_TIME, VERSION,
    },
    logger::{default_logs_datetime_format, LogLevel, ModuleConfig},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_TOPOLOGY_FILE: &str = "network.yaml";

// Functions Helpers
fn default_topology() -> String {
    DEFAULT_TOPOLOGY_FILE.to_owned()
}

fn default_log_filename() -> String {
    String::from("fabric-client.log")
}

fn default_logs_path() -> String {
    String::from("logs/")
}

fn default_chaincode_base_dir() -> String {
    DEFAULT_CHAINCODE_BASE_DIR.to_owned()
}

fn default_proposal_wait_ms() -> u64 {
    DEFAULT_PROPOSAL_WAIT_TIME.as_millis() as u64
}

fn default_commit_wait_secs() -> u64 {
    DEFAULT_COMMIT_WAIT_TIME.as_secs()
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct LogConfig {
    /// Set log level
    #[clap(long, value_enum, default_value_t)]
    #[serde(default)]
    pub log_level: LogLevel,
    /// Set file log level
    /// By default, it will be the same as log level
    #[clap(long, value_enum)]
    pub file_log_level: Option<LogLevel>,
    /// Disable the log file
    #[clap(long)]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Disable the log filename date based
    /// If disabled, the log file will be named fabric-client.log instead of YYYY-MM-DD.fabric-client.log
    #[clap(long)]
    #[serde(default)]
    pub disable_file_log_date_based: bool,
    /// Disable the usage of colors in log
    #[clap(long)]
    #[serde(default)]
    pub disable_log_color: bool,
    /// Log filename
    ///
    /// File will be stored in logs directory, this is only the filename, not the full path.
    #[clap(long, default_value_t = default_log_filename())]
    #[serde(default = "default_log_filename")]
    pub filename_log: String,
    /// Logs directory
    ///
    /// By default it will be logs/ of the current directory.
    #[clap(long, default_value_t = default_logs_path())]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Module configuration for logs, as <module>=<level>
    #[clap(long)]
    #[serde(default)]
    pub logs_modules: Vec<ModuleConfig>,
    /// Change the datetime format used by the logger
    #[clap(long, default_value_t = default_logs_datetime_format())]
    #[serde(default = "default_logs_datetime_format")]
    pub datetime_format: String,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct ChaincodeConfig {
    /// Chaincode staging directory
    ///
    /// Archives are extracted into its src/ sub directory.
    #[clap(long, default_value_t = default_chaincode_base_dir())]
    #[serde(default = "default_chaincode_base_dir")]
    pub chaincode_base_dir: String,
    /// Source location sent with install proposals
    /// By default, it will be the staging directory
    #[clap(long)]
    pub chaincode_source_dir: Option<String>,
    /// Endorsement policy file (YAML) applied to install and deploy
    /// The network default policy is used when the file does not exist
    #[clap(long)]
    pub endorsement_policy_file: Option<String>,
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Time to wait for each peer to answer a proposal, in milliseconds
    #[clap(long, default_value_t = default_proposal_wait_ms())]
    #[serde(default = "default_proposal_wait_ms")]
    pub proposal_wait_ms: u64,
    /// Time to wait for the commit event of an ordered transaction, in seconds
    #[clap(long, default_value_t = default_commit_wait_secs())]
    #[serde(default = "default_commit_wait_secs")]
    pub commit_wait_secs: u64,
}

#[derive(Parser, Debug, Serialize, Deserialize, Clone)]
#[clap(
    version = VERSION,
    about = "Fabric client - Manage channels, chaincode lifecycle and transactions of a Hyperledger Fabric network",
    long_about = r#"Fabric client - Channel, chaincode and transaction orchestration

Loads the network topology (organizations, peers, orderers and channels) and
executes a batch of commands against it.

BATCH FILE (JSON array, executed in order, stops at the first failure):
[
  { "command": "open_channel", "channel": "health" },
  { "command": "install", "channel": "health",
    "chaincode": { "name": "schedule", "path": "solvecare-chaincode" },
    "archive": "chaincode.tar.gz" },
  { "command": "deploy", "channel": "health",
    "chaincode": { "name": "schedule", "path": "solvecare-chaincode" } },
  { "command": "invoke", "channel": "health", "function": "set", "args": ["a", "10"] },
  { "command": "query", "channel": "health", "function": "get", "args": ["a"] },
  { "command": "register", "org": "clinic", "username": "user1" }
]

Without --simulate the topology and admin identities are checked and summarized.
With --simulate the batch runs against an in-memory network built from the topology."#
)]
#[command(styles = fabric_common::get_cli_styles())]
pub struct Config {
    /// Network topology file (JSON or YAML)
    #[clap(long, default_value_t = default_topology())]
    #[serde(default = "default_topology")]
    pub topology: String,
    /// JSON batch file of commands to execute
    #[clap(long)]
    pub batch_file: Option<String>,
    /// Run the batch against an in-memory simulated network
    #[clap(long)]
    #[serde(default)]
    pub simulate: bool,
    /// In simulation, start with every channel of the topology already
    /// created and joined by all its member peers
    #[clap(long)]
    #[serde(default)]
    pub simulate_existing_channels: bool,
    /// Directory where enrolled identities are persisted
    /// By default, identities are only kept in memory
    #[clap(long)]
    pub identity_store: Option<String>,
    /// Log configuration
    #[clap(flatten)]
    pub log: LogConfig,
    /// Chaincode configuration
    #[clap(flatten)]
    pub chaincode: ChaincodeConfig,
    /// Timeouts configuration
    #[clap(flatten)]
    pub timeouts: TimeoutConfig,
    /// JSON File to load the configuration from
    #[clap(long)]
    #[serde(skip)]
    #[serde(default)]
    pub config_file: Option<String>,
    /// Generate the template at the `config_file` path
    #[clap(long)]
    #[serde(skip)]
    #[serde(default)]
    pub generate_config_template: bool,
}

impl Config {
    pub fn gateway_settings(&self) -> GatewaySettings {
        let proposal_wait = Duration::from_millis(self.timeouts.proposal_wait_ms);
        let commit_wait = Duration::from_secs(self.timeouts.commit_wait_secs);

        GatewaySettings {
            lifecycle: LifecycleSettings {
                base_dir: PathBuf::from(&self.chaincode.chaincode_base_dir),
                source_dir: self.chaincode.chaincode_source_dir.as_ref().map(PathBuf::from),
                endorsement_policy_file: self
                    .chaincode
                    .endorsement_policy_file
                    .as_ref()
                    .map(PathBuf::from),
                proposal_wait,
                commit_wait,
            },
            transactions: TransactionSettings {
                proposal_wait,
                commit_wait,
            },
            identity_store: self.identity_store.as_ref().map(PathBuf::from),
        }
    }
}

// One step of a batch file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BatchCommand {
    OpenChannel {
        channel: String,
    },
    Install {
        channel: String,
        chaincode: ChaincodeDescriptor,
        archive: PathBuf,
    },
    Deploy {
        channel: String,
        chaincode: ChaincodeDescriptor,
    },
    Instantiate {
        channel: String,
        chaincode: ChaincodeDescriptor,
    },
    Upgrade {
        channel: String,
        chaincode: ChaincodeDescriptor,
    },
    Version {
        channel: String,
    },
    Invoke {
        channel: String,
        function: String,
        #[serde(default)]
        args: Vec<String>,
        // Registered user to act as, the channel admin when unset
        #[serde(default)]
        user: Option<String>,
    },
    Query {
        channel: String,
        function: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        user: Option<String>,
    },
    Register {
        org: String,
        username: String,
    },
}

impl BatchCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenChannel { .. } => "open_channel",
            Self::Install { .. } => "install",
            Self::Deploy { .. } => "deploy",
            Self::Instantiate { .. } => "instantiate",
            Self::Upgrade { .. } => "upgrade",
            Self::Version { .. } => "version",
            Self::Invoke { .. } => "invoke",
            Self::Query { .. } => "query",
            Self::Register { .. } => "register",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch() {
        let batch: Vec<BatchCommand> = serde_json::from_str(
            r#"[
                { "command": "open_channel", "channel": "health" },
                { "command": "install", "channel": "health",
                  "chaincode": { "name": "schedule", "path": "solvecare-chaincode", "version": "1" },
                  "archive": "chaincode.tar.gz" },
                { "command": "invoke", "channel": "health", "function": "set", "args": ["a", "10"] },
                { "command": "register", "org": "clinic", "username": "user1" }
            ]"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch[1].name(), "install");
        match &batch[2] {
            BatchCommand::Invoke { args, user, .. } => {
                assert_eq!(args, &["a", "10"]);
                assert!(user.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_settings() {
        let config = Config::parse_from(["fabric_client", "--simulate"]);
        assert!(config.simulate);
        assert_eq!(config.topology, DEFAULT_TOPOLOGY_FILE);

        let settings = config.gateway_settings();
        assert_eq!(settings.transactions.proposal_wait, DEFAULT_PROPOSAL_WAIT_TIME);
        assert_eq!(settings.lifecycle.commit_wait, DEFAULT_COMMIT_WAIT_TIME);
        assert!(settings.lifecycle.endorsement_policy_file.is_none());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = Config::parse_from([
            "fabric_client",
            "--topology",
            "net.json",
            "--commit-wait-secs",
            "5",
            "--logs-modules",
            "fabric_client::transaction=trace",
        ]);
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.topology, "net.json");
        assert_eq!(loaded.timeouts.commit_wait_secs, 5);
        assert_eq!(loaded.log.logs_modules.len(), 1);
    }
}
