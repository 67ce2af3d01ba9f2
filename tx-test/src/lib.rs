//! Protocol tests against scripted peers and orderer.

pub mod mocker;

mod collector;
mod listener;
mod session;
#[cfg(test)]
mod utils;
