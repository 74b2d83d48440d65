//! FlightSurety oracle server library
//!
//! Registers a fleet of simulated oracles with the FlightSuretyApp contract
//! and answers its flight-status requests.

pub mod app_state;
pub mod config;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod services;
