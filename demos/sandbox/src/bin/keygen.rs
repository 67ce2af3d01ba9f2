//! Enroll a client identity and write a sandbox config for it.

use std::process::exit;

use clap::{App, Arg};
use sandbox::{IdentityConfig, SandboxConfig};
use signkit::DefaultSigner;

fn main() {
    // Example:
    //  ./keygen -o=./test-output/admin-config.yml --msp=Org1MSP --state=./test-output/ledger.json
    let matches = App::new("sandbox-keygen")
        .version("0.1.0")
        .author("tsuko")
        .about("Generate client identity and sandbox config")
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .required(true)
                .help("Write config to this file"),
        )
        .arg(
            Arg::with_name("msp")
                .long("msp")
                .takes_value(true)
                .default_value("Org1MSP")
                .help("Membership service of the client"),
        )
        .arg(
            Arg::with_name("channel")
                .short("c")
                .long("channel")
                .takes_value(true)
                .help("Channel id, samchannel if not given"),
        )
        .arg(
            Arg::with_name("state")
                .short("s")
                .long("state")
                .takes_value(true)
                .help("Keep the sandbox ledger in this file between runs"),
        )
        .arg(
            Arg::with_name("down")
                .long("down")
                .takes_value(true)
                .multiple(true)
                .help("Peers that refuse connections"),
        )
        .arg(
            Arg::with_name("commit-latency")
                .long("commit-latency")
                .takes_value(true)
                .help("Milliseconds between ordering and commit"),
        )
        .get_matches();

    let output = matches.value_of("output").unwrap_or_default();
    let msp_id = matches.value_of("msp").unwrap_or("Org1MSP");

    let signer = DefaultSigner::random(msp_id);
    let secret_key = match signer.secret_to_string() {
        Ok(sk) => sk,
        Err(e) => {
            println!("{}", e);
            exit(-1);
        }
    };

    let mut conf = SandboxConfig::new(IdentityConfig {
        msp_id: msp_id.to_string(),
        secret_key,
    });
    if let Some(channel) = matches.value_of("channel") {
        conf.client.channel.channel_id = channel.to_string();
    }
    conf.network.state_file = matches.value_of("state").map(str::to_string);
    if let Some(down) = matches.values_of("down") {
        conf.network.down_peers = down.map(str::to_string).collect();
    }
    if let Some(ms) = matches.value_of("commit-latency") {
        match ms.parse::<u64>() {
            Ok(ms) => conf.network.commit_latency_ms = ms,
            Err(_) => {
                println!("expected milliseconds for --commit-latency");
                exit(-1);
            }
        }
    }

    if let Err(e) = conf.client.validate().and_then(|_| conf.save(output)) {
        println!("{}", e);
        exit(-1);
    }
    println!("{} enrolled with {}, config written to {}", msp_id, conf.client.channel.channel_id, output);
}
