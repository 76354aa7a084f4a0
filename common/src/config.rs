use std::time::Duration;

pub const VERSION: &str = env!("BUILD_VERSION");

// Chaincode version used when nothing is instantiated on a channel yet
pub const BASELINE_CHAINCODE_VERSION: u64 = 1;

// Function and arguments sent with every instantiate/upgrade proposal
pub const CHAINCODE_INIT_FUNCTION: &str = "init";
pub const CHAINCODE_INIT_ARGS: [&str; 2] = ["someArg", "0"];

// Keys of the transient map attached to lifecycle and query proposals.
// Peers ignore them, they only identify the origin of the request.
pub const TRANSIENT_ORIGIN_KEY: &str = "HyperLedgerFabric";
pub const TRANSIENT_METHOD_KEY: &str = "method";
pub const TRANSIENT_SDK_NAME: &str = "RustSDK";

// Time a peer has to answer a proposal before it is counted as failed
pub const DEFAULT_PROPOSAL_WAIT_TIME: Duration = Duration::from_millis(20_000);
// Time we wait for the commit event once the orderer accepted a transaction
pub const DEFAULT_COMMIT_WAIT_TIME: Duration = Duration::from_secs(30);

// Affiliation used when registering new identities against the CA
pub const DEFAULT_AFFILIATION: &str = "org1.department1";

// Chaincode staging directory, relative to the working directory.
// Archives are unpacked into its src/ sub directory.
pub const DEFAULT_CHAINCODE_BASE_DIR: &str = "chaincode/";

// Size of the random nonce mixed into every transaction id
pub const TX_NONCE_SIZE: usize = 24;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_wait_exceeds_proposal_wait() {
        assert!(DEFAULT_COMMIT_WAIT_TIME > DEFAULT_PROPOSAL_WAIT_TIME);
    }

    #[test]
    fn test_baseline_is_first_version() {
        assert_eq!(BASELINE_CHAINCODE_VERSION, 1);
    }
}
