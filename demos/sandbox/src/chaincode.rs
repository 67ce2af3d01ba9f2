//! Asset transfer chaincode run by every simulated peer.
//!
//! Holds integer balances. `init A Aval B Bval` seeds two accounts,
//! `move A B X` (alias `invoke`) transfers X from A to B, `query A` reads a
//! balance and `delete A` removes an account. Simulation never touches the
//! world state; it returns the read/write set that commit will validate.

use serde::{Deserialize, Serialize};
use tx_data::{ChaincodeID, Proposal, ProposalKind};

use crate::ledger::WorldState;

pub const MOVE_EVENT: &str = "moved";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RwSet {
    // key with the version observed, None if absent.
    pub reads: Vec<(String, Option<u64>)>,
    // None deletes the key.
    pub writes: Vec<(String, Option<String>)>,
}

/// What a peer endorses. Serialized as the proposal response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimResult {
    pub chaincode_id: ChaincodeID,
    // Chaincode version when simulated, None if not instantiated yet.
    pub base_version: Option<String>,
    // Version installed by a lifecycle transaction.
    pub lifecycle: Option<String>,
    pub rwset: RwSet,
    pub result: Vec<u8>,
    pub event: Option<(String, Vec<u8>)>,
}

struct Stub<'a> {
    state: &'a WorldState,
    cc: &'a str,
    rwset: RwSet,
    event: Option<(String, Vec<u8>)>,
}

impl<'a> Stub<'a> {
    fn get(&mut self, key: &str) -> Option<String> {
        let entry = self.state.get(self.cc, key);
        self.rwset
            .reads
            .push((key.to_string(), entry.map(|v| v.version)));
        entry.map(|v| v.value.clone())
    }

    fn put(&mut self, key: &str, value: String) {
        self.rwset.writes.push((key.to_string(), Some(value)));
    }

    fn del(&mut self, key: &str) {
        self.rwset.writes.push((key.to_string(), None));
    }
}

/// Run `prop` against `state`. `Err` carries the chaincode error message.
pub fn simulate(state: &WorldState, prop: &Proposal) -> Result<SimResult, String> {
    let cc = prop.chaincode_id();
    let base_version = state.version_of(cc).map(|v| v.to_string());
    let args = prop
        .args()
        .iter()
        .map(|a| String::from_utf8(a.clone()).map_err(|_| "arguments must be utf8".to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stub = Stub {
        state,
        cc,
        rwset: RwSet::default(),
        event: None,
    };

    let (lifecycle, result) = match prop.kind() {
        ProposalKind::Instantiate { version, .. } => {
            if let Some(v) = &base_version {
                return Err(format!("chaincode {} already instantiated with version {}", cc, v));
            }
            init(&mut stub, &args)?;
            (Some(version.clone()), vec![])
        }
        ProposalKind::Upgrade { version, .. } => {
            match &base_version {
                None => return Err(format!("chaincode {} not instantiated", cc)),
                Some(v) if v == version => {
                    return Err(format!("chaincode {} is already at version {}", cc, v))
                }
                Some(_) => {}
            }
            // Upgrade keeps the state unless new balances are given.
            if !args.is_empty() {
                init(&mut stub, &args)?;
            }
            (Some(version.clone()), vec![])
        }
        ProposalKind::Invoke | ProposalKind::Query => {
            if base_version.is_none() {
                return Err(format!("chaincode {} not instantiated", cc));
            }
            (None, invoke(&mut stub, prop.function(), &args)?)
        }
    };

    Ok(SimResult {
        chaincode_id: cc.clone(),
        base_version,
        lifecycle,
        rwset: stub.rwset,
        result,
        event: stub.event,
    })
}

fn parse_amount(s: &str) -> Result<i64, String> {
    s.parse::<i64>()
        .map_err(|_| "Expecting integer value for asset holding".to_string())
}

fn init(stub: &mut Stub, args: &[String]) -> Result<(), String> {
    if args.len() != 4 {
        return Err("Incorrect number of arguments. Expecting 4".to_string());
    }
    let a_val = parse_amount(&args[1])?;
    let b_val = parse_amount(&args[3])?;
    stub.put(&args[0], a_val.to_string());
    stub.put(&args[2], b_val.to_string());
    Ok(())
}

fn invoke(stub: &mut Stub, function: &str, args: &[String]) -> Result<Vec<u8>, String> {
    match function {
        "invoke" | "move" => transfer(stub, args),
        "delete" => {
            if args.len() != 1 {
                return Err("Incorrect number of arguments. Expecting 1".to_string());
            }
            stub.del(&args[0]);
            Ok(vec![])
        }
        "query" => {
            if args.len() != 1 {
                return Err("Incorrect number of arguments. Expecting name of the person to query".to_string());
            }
            stub.get(&args[0])
                .map(String::into_bytes)
                .ok_or_else(|| format!("Nil amount for {}", args[0]))
        }
        _ => Err("Received unknown function invocation".to_string()),
    }
}

fn transfer(stub: &mut Stub, args: &[String]) -> Result<Vec<u8>, String> {
    if args.len() != 3 {
        return Err("Incorrect number of arguments. Expecting 3".to_string());
    }
    let (a, b) = (&args[0], &args[1]);
    let a_val = stub
        .get(a)
        .ok_or_else(|| "Failed to get state".to_string())
        .and_then(|v| parse_amount(&v))?;
    let b_val = stub
        .get(b)
        .ok_or_else(|| "Failed to get state".to_string())
        .and_then(|v| parse_amount(&v))?;
    let x = parse_amount(&args[2])?;
    if x < 0 || a_val < x {
        return Err(format!("insufficient funds: {} holds {}, asked {}", a, a_val, x));
    }

    let b_new = b_val
        .checked_add(x)
        .ok_or_else(|| format!("balance overflow: {} holds {}, asked {}", b, b_val, x))?;

    stub.put(a, (a_val - x).to_string());
    stub.put(b, b_new.to_string());
    stub.event = Some((MOVE_EVENT.to_string(), format!("{}->{}:{}", a, b, x).into_bytes()));
    Ok(vec![])
}

#[cfg(test)]
mod test {
    use super::*;
    use tx_data::{SerializedIdentity, NONCE_SIZE};

    fn proposal(kind: ProposalKind, function: &str, args: &[&str]) -> Proposal {
        Proposal::new(
            "samchannel".to_string(),
            "mycc".to_string(),
            kind,
            function.to_string(),
            args.iter().map(|a| a.as_bytes().to_vec()).collect(),
            [0u8; NONCE_SIZE],
            SerializedIdentity::new("Org1MSP", b"admin".to_vec()),
        )
    }

    fn instantiate(version: &str) -> ProposalKind {
        ProposalKind::Instantiate {
            version: version.to_string(),
            policy: None,
        }
    }

    fn seeded() -> WorldState {
        let mut state = WorldState::default();
        let sim = simulate(&state, &proposal(instantiate("v0"), "init", &["a", "100", "b", "200"])).unwrap();
        state.apply(&sim, 1);
        state
    }

    #[test]
    fn test_init_requires_four_args() {
        let state = WorldState::default();
        let err = simulate(&state, &proposal(instantiate("v0"), "init", &["a", "100"])).unwrap_err();
        assert!(err.contains("Expecting 4"));
        let err = simulate(&state, &proposal(instantiate("v0"), "init", &["a", "x", "b", "1"])).unwrap_err();
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_move_records_reads_and_writes() {
        let state = seeded();
        let sim = simulate(&state, &proposal(ProposalKind::Invoke, "move", &["b", "a", "10"])).unwrap();

        assert_eq!(sim.base_version.as_deref(), Some("v0"));
        assert_eq!(
            sim.rwset.reads,
            vec![("b".to_string(), Some(1)), ("a".to_string(), Some(1))]
        );
        assert_eq!(
            sim.rwset.writes,
            vec![
                ("b".to_string(), Some("190".to_string())),
                ("a".to_string(), Some("110".to_string()))
            ]
        );
        assert_eq!(sim.event.unwrap().0, MOVE_EVENT);
    }

    #[test]
    fn test_invoke_errors() {
        let state = seeded();
        let err = simulate(&state, &proposal(ProposalKind::Invoke, "move", &["a", "b", "1000"])).unwrap_err();
        assert!(err.contains("insufficient funds"));
        let err = simulate(&state, &proposal(ProposalKind::Invoke, "burn", &["a"])).unwrap_err();
        assert_eq!(err, "Received unknown function invocation");
        let err = simulate(&state, &proposal(ProposalKind::Query, "query", &["c"])).unwrap_err();
        assert_eq!(err, "Nil amount for c");

        let empty = WorldState::default();
        let err = simulate(&empty, &proposal(ProposalKind::Invoke, "move", &["a", "b", "1"])).unwrap_err();
        assert!(err.contains("not instantiated"));
    }

    #[test]
    fn test_move_overflow_is_refused() {
        let mut state = WorldState::default();
        let init = proposal(instantiate("v0"), "init", &["a", "100", "b", "9223372036854775807"]);
        let sim = simulate(&state, &init).unwrap();
        state.apply(&sim, 1);

        let err = simulate(&state, &proposal(ProposalKind::Invoke, "move", &["a", "b", "1"])).unwrap_err();
        assert!(err.contains("balance overflow"), "{}", err);
        // Nothing moved.
        assert_eq!(state.get("mycc", "a").map(|v| v.value.as_str()), Some("100"));
    }

    #[test]
    fn test_lifecycle() {
        let state = seeded();
        assert!(simulate(&state, &proposal(instantiate("v1"), "init", &["a", "1", "b", "2"])).is_err());

        let upgrade = |v: &str| ProposalKind::Upgrade {
            version: v.to_string(),
            policy: None,
        };
        assert!(simulate(&state, &proposal(upgrade("v0"), "init", &[])).is_err());
        let sim = simulate(&state, &proposal(upgrade("v1"), "init", &[])).unwrap();
        assert_eq!(sim.lifecycle.as_deref(), Some("v1"));
        assert!(sim.rwset.writes.is_empty());
    }

    #[test]
    fn test_query_result() {
        let state = seeded();
        let sim = simulate(&state, &proposal(ProposalKind::Query, "query", &["b"])).unwrap();
        assert_eq!(sim.result, b"200".to_vec());
        assert!(sim.rwset.writes.is_empty());
    }
}
