pub mod aof;
pub mod command;
pub mod config;
pub mod dispatcher;
mod keyspace;
pub mod server;
pub mod skiplist;
pub mod storage;
pub mod zset;

pub use dispatcher::Dispatcher;
pub use server::run_server;
