//! Test for keygen and txcli binaries.

#[cfg(test)]
mod test_bin {
    use std::process::{Command, Output};

    const BIN_KEYGEN: &str = env!("CARGO_BIN_EXE_keygen");
    const BIN_TXCLI: &str = env!("CARGO_BIN_EXE_txcli");

    const CONFIG: &str = "./test-output/cli-admin-config.yml";
    const LEDGER: &str = "./test-output/cli-ledger.json";

    fn txcli(args: &[&str]) -> Output {
        Command::new(BIN_TXCLI)
            .arg(format!("--config={}", CONFIG))
            .args(args)
            .output()
            .expect("failed to run txcli")
    }

    fn stdout(out: &Output) -> String {
        String::from_utf8_lossy(&out.stdout).to_string()
    }

    #[test]
    fn test_bin_tx_flow() {
        //
        //  Steps:
        //      1. Enroll admin with a persistent ledger.
        //      2. Instantiate, move and query, one process each.
        //      3. Listen for the move event while triggering one.
        //      4. Read the chain height back from a peer.
        //
        std::fs::create_dir_all("./test-output").unwrap();
        let _ = std::fs::remove_file(LEDGER);

        assert!(Command::new(BIN_KEYGEN)
            .args(&[
                &format!("-o={}", CONFIG),
                "--msp=Org1MSP",
                &format!("--state={}", LEDGER),
                "--commit-latency=10",
            ])
            .output()
            .expect("failed to gen config")
            .status
            .success());

        let out = txcli(&["instantiate", "-n", "mycc", "-V", "v0", "-a", "a", "100", "b", "200"]);
        assert!(out.status.success(), "{}", stdout(&out));
        assert!(stdout(&out).contains("code=VALID block=1"), "{}", stdout(&out));

        let out = txcli(&["invoke", "-n", "mycc", "-f", "move", "-a", "b", "a", "10"]);
        assert!(out.status.success(), "{}", stdout(&out));
        assert!(stdout(&out).contains("code=VALID block=2"), "{}", stdout(&out));

        let out = txcli(&["query", "-n", "mycc", "-a", "b"]);
        assert!(out.status.success());
        assert!(stdout(&out).contains("peer0.org1: 190"), "{}", stdout(&out));
        assert!(stdout(&out).contains("peer1.org1: 190"), "{}", stdout(&out));

        let out = txcli(&[
            "cc-event", "-n", "mycc", "-e", "moved", "--timeout", "5", "--trigger", "mycc", "move", "a",
            "b", "1",
        ]);
        assert!(out.status.success(), "{}", stdout(&out));
        assert!(stdout(&out).contains("event moved from mycc"), "{}", stdout(&out));
        assert!(stdout(&out).contains("payload=a->b:1"), "{}", stdout(&out));

        // Chaincode refuses, nothing is ordered.
        let out = txcli(&["invoke", "-n", "mycc", "-f", "move", "-a", "b", "a", "1000"]);
        assert!(!out.status.success());
        assert!(stdout(&out).contains("endorse stage failed"), "{}", stdout(&out));

        let out = txcli(&["block-event", "--timeout", "5", "--trigger", "mycc", "move", "b", "a", "1"]);
        assert!(out.status.success(), "{}", stdout(&out));
        assert!(stdout(&out).contains("block 4 on samchannel with 1 txs"), "{}", stdout(&out));

        let out = txcli(&["channel-info", "--peer", "peer1.org1"]);
        assert!(out.status.success(), "{}", stdout(&out));
        assert!(
            stdout(&out).contains("peer1.org1 on samchannel: height=4 current="),
            "{}",
            stdout(&out)
        );
    }

    #[test]
    fn test_bin_bad_config() {
        let out = Command::new(BIN_TXCLI)
            .args(&["--config=./test-output/missing-config.yml", "query", "-n", "mycc", "-a", "a"])
            .output()
            .expect("failed to run txcli");
        assert!(!out.status.success());
        assert!(String::from_utf8_lossy(&out.stdout).contains("failed to read config"));
    }
}
