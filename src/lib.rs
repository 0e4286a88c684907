pub mod audit;
pub mod config;
pub mod errors;
pub mod gates;
pub mod init;
pub mod launcher;
pub mod ledger;
pub mod logging;
pub mod phase;
pub mod pipeline;
pub mod sequencer;
pub mod store;
pub mod verification;
