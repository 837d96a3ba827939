//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! client behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld      SimWorld        Compare
//!      (reference)   (real runtime)   Observable
//! ```

use chatty_harness::{ModelConnection, ModelWorld, Operation, SimWorld, model};
use proptest::prelude::*;

fn run_both(ops: &[Operation]) -> Result<(), TestCaseError> {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(async {
        let mut model = ModelWorld::new();
        let mut real = SimWorld::new();

        for (step, op) in ops.iter().enumerate() {
            model.apply(op);
            if let Err(err) = real.apply(op).await {
                return Err(TestCaseError::fail(format!("step {step} {op:?}: {err}")));
            }

            let expected = model.observable_state();
            let actual = real.observable_state();
            prop_assert_eq!(&actual, &expected, "diverged at step {} after {:?}", step, op);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The real client matches the model after every operation.
    #[test]
    fn prop_client_matches_model(ops in prop::collection::vec(model::operation(), 0..60)) {
        run_both(&ops)?;
    }
}

#[test]
fn offline_messages_arrive_through_history() {
    run_both(&[
        Operation::Login { user: 0 },
        Operation::NetworkDown,
        Operation::Receive { from: 1, content: "while away" },
        Operation::AdvanceTime,
        Operation::NetworkUp,
        Operation::AdvanceTime,
        Operation::Select { peer: 1 },
        Operation::Send { content: "back" },
    ])
    .unwrap();
}

#[test]
fn roster_follows_presence_across_reconnects() {
    let ops = [
        Operation::PeerPresence { peer: 1, online: true },
        Operation::Login { user: 0 },
        Operation::DropConnection,
        Operation::PeerPresence { peer: 2, online: true },
        Operation::PeerPresence { peer: 1, online: false },
        Operation::AdvanceTime,
    ];
    run_both(&ops).unwrap();

    let mut model = ModelWorld::new();
    for op in &ops {
        model.apply(op);
    }
    let state = model.observable_state();
    assert_eq!(state.connection, ModelConnection::Connected);
    assert_eq!(state.roster, ["carol"]);
}

#[test]
fn login_as_online_user_filters_self() {
    run_both(&[
        Operation::PeerPresence { peer: 0, online: true },
        Operation::PeerPresence { peer: 1, online: true },
        Operation::Login { user: 0 },
        Operation::Select { peer: 0 },
        Operation::RefreshRoster,
    ])
    .unwrap();
}
