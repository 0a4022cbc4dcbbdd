// @file: kline_engine/src/tests/mod.rs
// @description: In-crate test suites.
// @author: LAS.


pub mod fetcher_tests;
