//! Library crate for grid-nations-back, exposing modules for binaries and
//! integration tests.

pub mod catalog;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod state;
