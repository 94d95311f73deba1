pub mod chat;
pub mod config_cmd;
pub mod graph;
pub mod serve;
