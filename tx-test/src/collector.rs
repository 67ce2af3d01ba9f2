//! Endorsement collector test.
#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use endorser::{EndorsementCollector, PeerTransport, ProposalBuilder, TxErr};
    use tokio::time::Instant;
    use tx_data::{AtLeast, SignedProposal};

    use crate::mocker::{MockPeer, PeerScript};
    use crate::utils::{admin, init_logger, paused_runtime};

    fn proposal() -> SignedProposal {
        ProposalBuilder::new("samchannel", "mycc")
            .function("move")
            .args(vec!["b", "a", "10"])
            .build(admin().as_ref())
            .unwrap()
    }

    fn collector(peers: &[Arc<MockPeer>]) -> EndorsementCollector {
        let peers = peers
            .iter()
            .map(|p| p.clone() as Arc<dyn PeerTransport>)
            .collect();
        EndorsementCollector::new(peers, Duration::from_secs(3))
    }

    #[test]
    fn test_all_good() {
        init_logger();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default()),
            MockPeer::new("peer1", PeerScript::default()),
        ];
        let prop = proposal();
        let tx_id = prop.tx_id().clone();

        let tx = paused_runtime()
            .block_on(collector(&peers).collect(prop))
            .unwrap();
        assert_eq!(tx.tx_id(), &tx_id);
        assert_eq!(tx.responses().len(), 2);
        assert_eq!(tx.payload(), b"a=90,b=210");
        assert!(peers.iter().all(|p| p.num_proposals() == 1));
    }

    #[test]
    fn test_any_bad_peer_fails_endorsement() {
        init_logger();
        // The failing peer's position and the others' results don't matter.
        for bad in 0..3 {
            let peers = (0..3)
                .map(|i| {
                    let script = if i == bad {
                        PeerScript::default().status(500)
                    } else {
                        PeerScript::default()
                    };
                    MockPeer::new(&format!("peer{}", i), script)
                })
                .collect::<Vec<_>>();

            let err = paused_runtime()
                .block_on(collector(&peers).collect(proposal()))
                .unwrap_err();
            match err {
                TxErr::EndorsementFailed { peer, reason } => {
                    assert_eq!(peer, Some(format!("peer{}", bad)));
                    assert!(reason.contains("500"), "{}", reason);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_transport_error_fails_endorsement() {
        init_logger();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default()),
            MockPeer::new("peer1", PeerScript::default().unreachable()),
        ];
        let err = paused_runtime()
            .block_on(collector(&peers).collect(proposal()))
            .unwrap_err();
        match err {
            TxErr::EndorsementFailed { peer, reason } => {
                assert_eq!(peer.as_deref(), Some("peer1"));
                assert!(reason.contains("connection refused"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fan_out_is_concurrent_with_per_peer_timeout() {
        init_logger();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default().endorse_delay(Duration::from_secs(2))),
            MockPeer::new("peer1", PeerScript::default().endorse_delay(Duration::from_secs(2))),
            MockPeer::new("peer2", PeerScript::default().endorse_delay(Duration::from_secs(60))),
        ];

        let (err, elapsed) = paused_runtime().block_on(async {
            let start = Instant::now();
            let r = collector(&peers).collect(proposal()).await;
            (r.unwrap_err(), start.elapsed())
        });

        // Join point waits for the slowest answer, bounded by the 3s per-peer timeout.
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
        assert!(matches!(
            err,
            TxErr::EndorsementFailed { peer: Some(ref p), .. } if p == "peer2"
        ));
    }

    #[test]
    fn test_at_least_policy_tolerates_failure() {
        init_logger();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default().unreachable()),
            MockPeer::new("peer1", PeerScript::default()),
            MockPeer::new("peer2", PeerScript::default()),
        ];
        let tx = paused_runtime()
            .block_on(
                collector(&peers)
                    .with_policy(Arc::new(AtLeast(2)))
                    .collect(proposal()),
            )
            .unwrap();
        let endorsers = tx.responses().iter().map(|r| r.peer.as_str()).collect::<Vec<_>>();
        assert_eq!(endorsers, vec!["peer1", "peer2"]);
    }

    #[test]
    fn test_diverging_payloads_fail() {
        init_logger();
        let mut other = PeerScript::default();
        other.payload = b"a=80,b=220".to_vec();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default()),
            MockPeer::new("peer1", other),
        ];
        let err = paused_runtime()
            .block_on(collector(&peers).collect(proposal()))
            .unwrap_err();
        assert!(matches!(
            err,
            TxErr::EndorsementFailed { peer: Some(ref p), .. } if p == "peer1"
        ));
    }

    #[test]
    fn test_query_returns_answering_peers() {
        init_logger();
        let peers = vec![
            MockPeer::new("peer0", PeerScript::default()),
            MockPeer::new("peer1", PeerScript::default().status(500)),
        ];
        let prop = ProposalBuilder::new("samchannel", "mycc")
            .kind(tx_data::ProposalKind::Query)
            .function("query")
            .arg("b")
            .build(admin().as_ref())
            .unwrap();

        let rt = paused_runtime();
        let payloads = rt.block_on(collector(&peers).query(&prop)).unwrap();
        assert_eq!(payloads, vec![("peer0".to_string(), b"a=90,b=210".to_vec())]);

        let down = vec![MockPeer::new("peer0", PeerScript::default().unreachable())];
        let err = rt.block_on(collector(&down).query(&prop)).unwrap_err();
        assert!(matches!(err, TxErr::EndorsementFailed { .. }));
    }
}
