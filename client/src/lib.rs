pub mod archive;
pub mod ca;
pub mod channel;
pub mod config;
pub mod endorsement;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod membership;
pub mod ordering;
pub mod simulator;
pub mod transaction;
pub mod transport;
pub mod version;
