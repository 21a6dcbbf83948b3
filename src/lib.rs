#![allow(dead_code)]

pub mod api;
pub mod config;
pub mod exchanges;
pub mod execution;
pub mod models;
pub mod momentum;
pub mod persistence;
pub mod signals;
pub mod telemetry;
pub mod triarb;
