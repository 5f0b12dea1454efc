//! End-to-end tests for the support chat service. Each test spawns the
//! full router against a throwaway MongoDB database, so they are marked
//! `#[ignore]` and run explicitly where a mongod is available:
//!
//! ```sh
//! STORECHAT_TEST_MONGO_URI=mongodb://localhost:27017 cargo test -p storechat-tests -- --ignored
//! ```


#[cfg(test)]
mod message_tests;
#[cfg(test)]
mod ws_tests;
