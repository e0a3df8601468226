//! Propolis bot: relays release reports to an IRC channel.
//!
//! Nodes forward their reports to a central bot, which publishes each one
//! once in the announce channel. Both roles accept local analysis requests
//! over HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Wire format between nodes and the central bot.
pub mod codec;
/// TOML configuration loading and validation.
pub mod config;
/// SQLite store of already published reports.
pub mod dedup;
/// `POST /downloads` ingestion server.
pub mod ingest;
/// Tracker permalink lookup.
pub mod permalink;
/// Node/Central relay state machine.
pub mod relay;
/// `!propolis` tracker lookup and varroa order.
pub mod snatch;
/// Chat transport seam and IRC client.
pub mod transport;
/// Image host and paste service clients.
pub mod uploads;
