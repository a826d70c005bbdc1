pub mod cache;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod fixture;
pub mod handler;
pub mod limits;
pub mod model;
pub mod observability;
pub mod ports;
pub mod reaper;
pub mod scheduler;
pub mod service;
