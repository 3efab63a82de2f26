//! Metrics for the pipeline stages.

use lazy_static::lazy_static;
use prometheus::{
    self, register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static! {
    /// Tracks the number of blocks fetched by the fetcher pool.
    pub static ref BLOCKS_FETCHED: IntCounter = register_int_counter!(
        "dacost_blocks_fetched",
        "Number of blocks fetched"
    ).expect("Blocks Fetched failed to register");

    /// Tracks the number of blocks dropped after exhausting their retries.
    pub static ref BLOCKS_DROPPED: IntCounter = register_int_counter!(
        "dacost_blocks_dropped",
        "Number of blocks dropped after exhausting retries"
    ).expect("Blocks Dropped failed to register");

    /// Tracks the number of failed fetch attempts that were retried.
    pub static ref FETCH_RETRIES: IntCounter = register_int_counter!(
        "dacost_fetch_retries",
        "Number of retried block fetches"
    ).expect("Fetch Retries failed to register");

    /// Tracks the number of transactions by how the estimator handled them.
    pub static ref TRANSACTIONS: IntCounterVec = register_int_counter_vec!(
        "dacost_transactions",
        "Number of transactions seen by the estimator",
        &["outcome"]
    ).expect("Transactions failed to register");

    /// Tracks the number of records written to the output.
    pub static ref RECORDS_WRITTEN: IntCounter = register_int_counter!(
        "dacost_records_written",
        "Number of estimation records written"
    ).expect("Records Written failed to register");

    /// Tracks the number of records that failed to be written.
    pub static ref WRITE_FAILURES: IntCounter = register_int_counter!(
        "dacost_write_failures",
        "Number of estimation records that failed to be written"
    ).expect("Write Failures failed to register");

    /// Tracks the block number of the last record written.
    pub static ref LAST_BLOCK_WRITTEN: IntGauge = register_int_gauge!(
        "dacost_last_block_written",
        "Block number of the last record written"
    ).expect("Last Block Written failed to register");

    /// Tracks the number of zlib window rotations.
    pub static ref WINDOW_ROTATIONS: IntGauge = register_int_gauge!(
        "dacost_zlib_window_rotations",
        "Number of zlib window rotations"
    ).expect("Window Rotations failed to register");
}
