//! Run transactions and watch events on the sandbox channel.
use std::{future::Future, path::Path, process::exit, sync::Arc, time::Duration};

use clap::{App, Arg, ArgMatches, SubCommand};
use endorser::PeerTransport;
use log::{info, LevelFilter};
use orchestrator::{
    query_chain_info, wait_chaincode_event, wait_next_block, CommitResult, Connector, EventErr,
    TxRequest,
};
use sandbox::{init_logger, open_network, open_session, show_payload, SandboxConfig, SandboxErr, SimNetwork};

const SC_INVOKE: &str = "invoke";
const SC_QUERY: &str = "query";
const SC_INSTANTIATE: &str = "instantiate";
const SC_UPGRADE: &str = "upgrade";
const SC_CC_EVENT: &str = "cc-event";
const SC_BLOCK_EVENT: &str = "block-event";
const SC_CHANNEL_INFO: &str = "channel-info";

fn tx_args(app: App<'static, 'static>, default_fn: &'static str) -> App<'static, 'static> {
    app.arg(
        Arg::with_name("chaincode")
            .short("n")
            .long("name")
            .takes_value(true)
            .help("Chaincode id"),
    )
    .arg(
        Arg::with_name("function")
            .short("f")
            .long("function")
            .takes_value(true)
            .default_value(default_fn)
            .help("Chaincode function"),
    )
    .arg(
        Arg::with_name("args")
            .short("a")
            .long("args")
            .takes_value(true)
            .multiple(true)
            .allow_hyphen_values(true)
            .help("Chaincode arguments"),
    )
}

fn lifecycle_args(app: App<'static, 'static>) -> App<'static, 'static> {
    tx_args(app, "init")
        .arg(
            Arg::with_name("version")
                .short("V")
                .long("version")
                .takes_value(true)
                .required(true)
                .help("Chaincode version"),
        )
        .arg(
            Arg::with_name("policy")
                .short("p")
                .long("policy")
                .takes_value(true)
                .help("Endorsement policy of the chaincode"),
        )
}

fn peer_args(app: App<'static, 'static>) -> App<'static, 'static> {
    app.arg(
        Arg::with_name("peer")
            .long("peer")
            .takes_value(true)
            .help("Peer to ask, the first event source if not given"),
    )
    .arg(
        Arg::with_name("timeout")
            .short("t")
            .long("timeout")
            .takes_value(true)
            .default_value("30")
            .help("Seconds to wait"),
    )
}

fn event_args(app: App<'static, 'static>) -> App<'static, 'static> {
    peer_args(app).arg(
        Arg::with_name("trigger")
            .long("trigger")
            .takes_value(true)
            .multiple(true)
            .allow_hyphen_values(true)
            .help("Invoke <chaincode> <function> <args>.. while listening"),
    )
}

fn main() {
    // Example:
    //  ./txcli -c=./test-output/admin-config.yml instantiate -n mycc -V v0 -a a 100 b 200
    //  ./txcli -c=./test-output/admin-config.yml invoke -n mycc -f move -a b a 10
    let matches = App::new("sandbox-txcli")
        .version("0.1.0")
        .author("tsuko")
        .about("Submit transactions to the sandbox channel")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .required(true)
                .help("Sandbox config written by keygen"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Debug logging"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .help("Also write a debug log to this file"),
        )
        .subcommand(tx_args(
            SubCommand::with_name(SC_INVOKE).about("Endorse, order and wait for commit"),
            "invoke",
        ))
        .subcommand(tx_args(
            SubCommand::with_name(SC_QUERY).about("Evaluate on every peer, nothing is ordered"),
            "query",
        ))
        .subcommand(lifecycle_args(
            SubCommand::with_name(SC_INSTANTIATE).about("Instantiate a chaincode on the channel"),
        ))
        .subcommand(lifecycle_args(
            SubCommand::with_name(SC_UPGRADE).about("Upgrade an instantiated chaincode"),
        ))
        .subcommand(event_args(
            SubCommand::with_name(SC_CC_EVENT)
                .about("Wait for a chaincode event")
                .arg(
                    Arg::with_name("chaincode")
                        .short("n")
                        .long("name")
                        .takes_value(true)
                        .required(true)
                        .help("Chaincode id"),
                )
                .arg(
                    Arg::with_name("event")
                        .short("e")
                        .long("event")
                        .takes_value(true)
                        .required(true)
                        .help("Event name"),
                ),
        ))
        .subcommand(event_args(
            SubCommand::with_name(SC_BLOCK_EVENT).about("Wait for the next block"),
        ))
        .subcommand(peer_args(
            SubCommand::with_name(SC_CHANNEL_INFO).about("Ledger height and head hashes of a peer"),
        ))
        .get_matches();

    let level = if matches.is_present("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    init_logger(level, matches.value_of("log").map(Path::new));

    let conf = match SandboxConfig::load(matches.value_of("config").unwrap_or_default()) {
        Ok(conf) => conf,
        Err(e) => {
            println!("{}", e);
            exit(-1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("can't start runtime: {}", e);
            exit(-1);
        }
    };
    if let Err(e) = rt.block_on(run(&conf, &matches)) {
        println!("{}", e);
        exit(1);
    }
}

async fn run(conf: &SandboxConfig, matches: &ArgMatches<'static>) -> Result<(), SandboxErr> {
    let network = open_network(conf)?;
    match matches.subcommand() {
        (SC_INVOKE, Some(sub)) => {
            let (cc, args) = chaincode_args(sub)?;
            let req = TxRequest::invoke(cc, sub.value_of("function").unwrap_or("invoke"), args);
            let res = open_session(conf, &network)?.submit(req).await?;
            print_commit(&res);
        }
        (SC_QUERY, Some(sub)) => {
            let (cc, args) = chaincode_args(sub)?;
            let req = TxRequest::query(cc, sub.value_of("function").unwrap_or("query"), args);
            for (peer, payload) in open_session(conf, &network)?.query(req).await? {
                println!("{}: {}", peer, show_payload(&payload));
            }
        }
        (sc @ SC_INSTANTIATE, Some(sub)) | (sc @ SC_UPGRADE, Some(sub)) => {
            let (cc, args) = chaincode_args(sub)?;
            let version = sub.value_of("version").unwrap_or_default();
            let mut req = TxRequest::lifecycle(
                cc,
                version,
                sc == SC_UPGRADE,
                sub.value_of("policy").map(str::to_string),
                args,
            );
            req.function = sub.value_of("function").map(str::to_string);
            let res = open_session(conf, &network)?.submit(req).await?;
            print_commit(&res);
        }
        (SC_CC_EVENT, Some(sub)) => {
            let peer = event_peer(conf, &network, sub.value_of("peer"))?;
            let cc = sub.value_of("chaincode").unwrap_or_default();
            let name = sub.value_of("event").unwrap_or_default();
            let wait = wait_chaincode_event(peer.as_ref(), cc, name, timeout_of(sub)?);
            let ev = with_trigger(wait, conf, &network, trigger_of(sub)?).await?;
            println!(
                "event {} from {} tx={} block={} payload={}",
                ev.event_name,
                ev.chaincode_id,
                ev.tx_id,
                ev.block_number,
                show_payload(&ev.payload)
            );
        }
        (SC_BLOCK_EVENT, Some(sub)) => {
            let peer = event_peer(conf, &network, sub.value_of("peer"))?;
            let wait = wait_next_block(peer.as_ref(), timeout_of(sub)?);
            let ev = with_trigger(wait, conf, &network, trigger_of(sub)?).await?;
            println!(
                "block {} on {} with {} txs",
                ev.block_number,
                ev.channel_id,
                ev.tx_ids.len()
            );
        }
        (SC_CHANNEL_INFO, Some(sub)) => {
            let peer = event_peer(conf, &network, sub.value_of("peer"))?;
            let info = query_chain_info(peer.as_ref(), timeout_of(sub)?).await?;
            println!(
                "{} on {}: height={} current={} previous={}",
                peer.endpoint(),
                network.ledger().channel_id(),
                info.height,
                info.current_hash_hex(),
                info.previous_hash_hex()
            );
        }
        _ => return Err(SandboxErr::Args("expected a subcommand, see --help".to_string())),
    }
    info!("ledger height {}", network.ledger().height());
    Ok(())
}

fn chaincode_args(sub: &ArgMatches) -> Result<(String, Vec<String>), SandboxErr> {
    let cc = sub
        .value_of("chaincode")
        .ok_or_else(|| SandboxErr::Args("missing chaincode name (-n)".to_string()))?;
    let args = sub
        .values_of("args")
        .map(|v| v.map(str::to_string).collect())
        .unwrap_or_default();
    Ok((cc.to_string(), args))
}

fn timeout_of(sub: &ArgMatches) -> Result<Duration, SandboxErr> {
    let secs = sub.value_of("timeout").unwrap_or("30");
    secs.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| SandboxErr::Args(format!("expected seconds, got {}", secs)))
}

fn trigger_of(sub: &ArgMatches) -> Result<Option<TxRequest>, SandboxErr> {
    let words = match sub.values_of("trigger") {
        Some(v) => v.map(str::to_string).collect::<Vec<_>>(),
        None => return Ok(None),
    };
    match words.split_first() {
        Some((cc, rest)) if !rest.is_empty() => Ok(Some(TxRequest::invoke(
            cc.clone(),
            rest[0].clone(),
            rest[1..].to_vec(),
        ))),
        _ => Err(SandboxErr::Args(
            "--trigger needs a chaincode and a function".to_string(),
        )),
    }
}

fn event_peer(
    conf: &SandboxConfig,
    network: &SimNetwork,
    peer_id: Option<&str>,
) -> Result<Arc<dyn PeerTransport>, SandboxErr> {
    let info = match peer_id {
        Some(id) => conf.client.channel.peers.iter().find(|p| p.peer_id == id),
        None => conf.client.event_sources().next(),
    };
    match info {
        Some(info) => Ok(network.peer(info)?),
        None => Err(SandboxErr::Args(format!(
            "no peer {} on channel",
            peer_id.unwrap_or_default()
        ))),
    }
}

/// Wait on `wait` while `trigger` runs to commit on a fresh session.
async fn with_trigger<T, F>(
    wait: F,
    conf: &SandboxConfig,
    network: &SimNetwork,
    trigger: Option<TxRequest>,
) -> Result<T, SandboxErr>
where
    F: Future<Output = Result<T, EventErr>>,
{
    match trigger {
        None => Ok(wait.await?),
        Some(req) => {
            let session = open_session(conf, network)?;
            // The listener subscribes on its first poll, ahead of the proposal.
            let (ev, res) = tokio::join!(wait, session.submit(req));
            print_commit(&res?);
            Ok(ev?)
        }
    }
}

fn print_commit(res: &CommitResult) {
    println!(
        "committed tx={} code={} block={} peer={}",
        res.tx_id, res.validation_code, res.block_number, res.source_peer
    );
}
