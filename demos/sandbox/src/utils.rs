use std::{path::Path, sync::Arc};

use endorser::TransportErr;
use log::LevelFilter;
use orchestrator::{ConfigErr, EventErr, Session, SessionErr};
use signkit::{DefaultSigner, SignErr};
use simplelog::{CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger};
use thiserror::Error;

use crate::{
    config::{IdentityConfig, SandboxConfig},
    ledger::{LedgerErr, SharedLedger},
    network::SimNetwork,
};

#[derive(Debug, Error)]
pub enum SandboxErr {
    #[error(transparent)]
    Config(#[from] ConfigErr),

    #[error("identity: {0}")]
    Identity(#[from] SignErr),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerErr),

    #[error(transparent)]
    Session(#[from] SessionErr),

    #[error(transparent)]
    Event(#[from] EventErr),

    #[error(transparent)]
    Transport(#[from] TransportErr),

    #[error("invalid argument: {0}")]
    Args(String),
}

/// Terminal logging, plus a log file when `log_file` is given.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) {
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> =
        vec![TermLogger::new(level, Config::default(), TerminalMode::Stderr)];
    if let Some(f) = log_file.and_then(|p| std::fs::File::create(p).ok()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), f));
    }
    let _ = CombinedLogger::init(loggers);
}

pub fn load_signer(identity: &IdentityConfig) -> Result<DefaultSigner, SandboxErr> {
    Ok(DefaultSigner::from_secret_string(
        identity.msp_id.clone(),
        &identity.secret_key,
    )?)
}

/// Simulated network for `conf`, with its ledger restored from the state file if any.
pub fn open_network(conf: &SandboxConfig) -> Result<SimNetwork, SandboxErr> {
    let channel_id = conf.client.channel.channel_id.clone();
    let ledger = match &conf.network.state_file {
        Some(path) => SharedLedger::open(channel_id, path)?,
        None => SharedLedger::new(channel_id),
    };
    Ok(SimNetwork::new(Arc::new(ledger), conf.network.clone()))
}

pub fn open_session(conf: &SandboxConfig, network: &SimNetwork) -> Result<Session, SandboxErr> {
    let signer = Arc::new(load_signer(&conf.identity)?);
    Ok(Session::connect(&conf.client, network, signer)?)
}

/// Printable form of a payload: the text if utf8, base64 otherwise.
pub fn show_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(s) => s.to_string(),
        Err(_) => format!("base64:{}", base64::encode(payload)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_show_payload() {
        assert_eq!(show_payload(b"290"), "290");
        assert_eq!(show_payload(&[0xff, 0xfe]), "base64://4=");
    }

    #[test]
    fn test_load_signer() {
        let signer = DefaultSigner::random("Org1MSP");
        let identity = IdentityConfig {
            msp_id: "Org1MSP".to_string(),
            secret_key: signer.secret_to_string().unwrap(),
        };
        assert_eq!(load_signer(&identity).unwrap().public_key(), signer.public_key());

        let broken = IdentityConfig {
            secret_key: "not-a-key".to_string(),
            ..identity
        };
        assert!(matches!(load_signer(&broken), Err(SandboxErr::Identity(_))));
    }
}
