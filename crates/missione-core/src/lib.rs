//! # missione-core
//!
//! Foundation types for the warehouse mission relay:
//!
//! - **Records**: [`mission::Mission`] (the four-integer payload) and
//!   [`mission::StampedMission`] (record + sequence number + timestamp)
//! - **Greeting**: [`mission::Hello`], the first frame every streaming
//!   client receives
//! - **Parsing**: [`parse::parse_mission`] over the [`parse::Payload`]
//!   tagged input, with [`parse::ParseError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `missione-server` and `missioned`.

#![deny(unsafe_code)]

pub mod mission;
pub mod parse;
