// @file: kline_engine/src/core/mod.rs
// @description: Exports domain types, errors, the cache contract and the range orchestrator.
// @author: LAS.

pub mod errors;
pub mod interfaces;
pub mod models;
pub mod orchestrator;
pub mod timestamps;
