pub mod balance;
pub mod config;
pub mod decision;
pub mod engine;
pub mod forecast;
pub mod sizing;
pub mod storage;
