//! PPT invariants for the simulation kernel.
//!
//! Structural code calls [`assert_invariant`] at the point where an invariant
//! must hold. A failure panics with the invariant's name. With the `ppt`
//! feature every passing check is also recorded, so a contract test can
//! prove that a scenario actually exercised the checks it relies on.

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use std::collections::BTreeSet;
#[cfg(feature = "ppt")]
use std::sync::Mutex;

/// Every edge is recorded in both adjacency maps.
pub const GRAPH_LEGALITY: u32 = 1;
/// `get_order` places every vertex exactly once.
pub const ORDER_SOUNDNESS: u32 = 2;
/// Cut gates are gates of the definition being planned.
pub const PLAN_CUT_GATES: u32 = 3;
/// Connected pins have equal widths.
pub const CONNECTION_WIDTHS: u32 = 4;
/// An input pin has at most one driver.
pub const SINGLE_DRIVER: u32 = 5;
/// No definition contains itself, directly or through others.
pub const TYPE_GRAPH_ACYCLIC: u32 = 6;
/// A tick leaves outputs that fit the sink.
pub const STATE_SHAPE: u32 = 7;
/// Instances mirror their definition's boundary after an edit.
pub const EDIT_CASCADE: u32 = 8;
/// Loading maps every stored uid onto a live gate.
pub const UID_REMAP: u32 = 9;

/// Human name of an invariant ID, for failure messages.
pub fn invariant_name(id: u32) -> &'static str {
    match id {
        GRAPH_LEGALITY => "graph legality",
        ORDER_SOUNDNESS => "order soundness",
        PLAN_CUT_GATES => "plan cut gates",
        CONNECTION_WIDTHS => "connection widths",
        SINGLE_DRIVER => "single driver",
        TYPE_GRAPH_ACYCLIC => "acyclic type graph",
        STATE_SHAPE => "state shape",
        EDIT_CASCADE => "edit cascade",
        UID_REMAP => "uid remap",
        _ => "unnamed",
    }
}

fn failure(id: u32, message: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) => format!("invariant {id} ({}) violated in {ctx}: {message}", invariant_name(id)),
        None => format!("invariant {id} ({}) violated: {message}", invariant_name(id)),
    }
}

#[cfg(feature = "ppt")]
lazy_static! {
    static ref CHECKED: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());
}

/// Check an invariant, recording it when it holds and panicking when not.
#[cfg(feature = "ppt")]
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let text = failure(id, message, context);
        tracing::error!("{text}");
        panic!("{text}");
    }
    // A poisoned log only loses bookkeeping.
    if let Ok(mut checked) = CHECKED.lock() {
        checked.insert(id);
    }
}

#[cfg(not(feature = "ppt"))]
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        panic!("{}", failure(id, message, context));
    }
}

/// Invariants checked so far in this process.
#[cfg(feature = "ppt")]
pub fn checked_invariants() -> BTreeSet<u32> {
    CHECKED
        .lock()
        .map(|checked| checked.clone())
        .unwrap_or_default()
}

/// Fail unless every invariant in `required` has been checked.
#[cfg(feature = "ppt")]
pub fn contract_test(test_name: &str, required: &[u32]) {
    let checked = checked_invariants();
    let missing: Vec<String> = required
        .iter()
        .filter(|id| !checked.contains(id))
        .map(|&id| format!("{id} ({})", invariant_name(id)))
        .collect();
    if !missing.is_empty() {
        panic!("contract '{test_name}' never checked: {}", missing.join(", "));
    }
}

#[cfg(not(feature = "ppt"))]
pub fn contract_test(_test_name: &str, _required: &[u32]) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_invariant_is_quiet() {
        assert_invariant(SINGLE_DRIVER, true, "one driver", Some("unit test"));
    }

    #[test]
    #[should_panic(expected = "single driver")]
    fn broken_invariant_names_itself() {
        assert_invariant(SINGLE_DRIVER, false, "two drivers", None);
    }

    #[test]
    fn contract_sees_checked_invariants() {
        assert_invariant(UID_REMAP, true, "recorded", None);
        contract_test("uid remap recorded", &[UID_REMAP]);
    }

    #[test]
    fn every_id_has_a_name() {
        for id in GRAPH_LEGALITY..=UID_REMAP {
            assert_ne!(invariant_name(id), "unnamed");
        }
    }
}
