//! Propolis: a rule checker for FLAC music releases.
//!
//! Evaluates graded rules against a release folder and prints a report.
//! The companion `propolis-bot` crate relays reports to an IRC channel.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod check;
pub mod release;
pub mod rules;

pub mod analyzer;
pub mod spectrogram;

pub mod logging;
