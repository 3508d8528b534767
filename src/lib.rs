pub mod candidates;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod live;
pub mod player;
pub mod playlist;
pub mod session;
pub mod storage;
pub mod timer;
pub mod utils;
