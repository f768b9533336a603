pub mod dispatcher;
pub mod ledger;
pub mod outcome;
pub mod parser;
pub mod poller;
pub mod process;
pub mod reporter;
pub mod task;
pub mod terminal;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
