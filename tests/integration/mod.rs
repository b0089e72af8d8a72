//! Integration tests for vault transactions

mod test_utils;

mod commit_scenarios;
mod filter_warnings;
mod modify_delete;
mod persistent_store;
mod sub_node_folding;
