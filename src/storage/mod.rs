// @file: kline_engine/src/storage/mod.rs
// @description: Local archive cache and the day-archive decoder behind it.
// @author: LAS.

pub mod decode;
pub mod local;
