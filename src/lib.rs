//! LAN reconnaissance and honeypot monitoring for single-threaded hosts.
//!
//! Sweeps (`scanner`) and the decoy responder (`decoy`) share one
//! [`blocklist::BlockList`]; inbound decoy traffic lands in a bounded
//! [`ledger::ConnectionLedger`]. `server` exposes both over HTTP.
pub mod blocklist;
pub mod config;
pub mod decoy;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod netdetect;
pub mod prober;
pub mod range;
pub mod scanner;
pub mod server;
pub mod services;
pub mod store;
pub mod types;
