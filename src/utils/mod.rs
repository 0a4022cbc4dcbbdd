// @file: kline_engine/src/utils/mod.rs
// @description: Configuration loading and the retry policy.
// @author: LAS.

pub mod config;
pub mod retry;
