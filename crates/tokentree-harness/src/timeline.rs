//! History-based oracles.
//!
//! Unlike the state invariants these look only at what nodes recorded, so
//! they apply equally to simulator runs, runtime clusters and histories read
//! back from a file.

use std::collections::HashSet;

use tokentree_core::{History, HistoryEvent};
use tokentree_proto::{MessageKind, NodeId};

use crate::invariants::{InvariantResult, Violation};

fn violation(invariant: &'static str, message: String) -> Violation {
    Violation { invariant, message }
}

/// Critical-section intervals never overlap system-wide.
///
/// Entries stamped with the same instant are ordered exits first, since a
/// hand-off over an instantaneous transport records both at once.
pub fn check_cs_timeline(histories: &[History]) -> InvariantResult {
    let mut events: Vec<_> = History::merge(histories)
        .into_iter()
        .filter(|entry| matches!(entry.event, HistoryEvent::EnteredCs | HistoryEvent::ExitedCs))
        .collect();
    events.sort_by_key(|entry| (entry.at, matches!(entry.event, HistoryEvent::EnteredCs)));

    let mut inside: Option<NodeId> = None;
    for entry in events {
        match (entry.event, inside) {
            (HistoryEvent::EnteredCs, None) => inside = Some(entry.node),
            (HistoryEvent::EnteredCs, Some(other)) => {
                return Err(violation(
                    "CsTimeline",
                    format!("node {} entered at {:?} while {other} inside", entry.node, entry.at),
                ));
            },
            (HistoryEvent::ExitedCs, Some(node)) if node == entry.node => inside = None,
            (_, _) => {
                return Err(violation(
                    "CsTimeline",
                    format!("node {} exited at {:?} while {inside:?} inside", entry.node, entry.at),
                ));
            },
        }
    }
    Ok(())
}

/// A node never hands the token over between `entered CS` and `exited CS`.
pub fn check_privilege_after_exit(history: &History) -> InvariantResult {
    let mut using = false;
    for entry in history.entries() {
        match &entry.event {
            HistoryEvent::EnteredCs => using = true,
            HistoryEvent::ExitedCs => using = false,
            HistoryEvent::Sent {
                kind: MessageKind::Privilege | MessageKind::PrivilegeAndRequest,
                to,
            } if using => {
                return Err(violation(
                    "PrivilegeAfterExit",
                    format!("node {} sent the token to {to} at {:?} while using it", history.node(), entry.at),
                ));
            },
            _ => {},
        }
    }
    Ok(())
}

/// Every `Queue content` line lists distinct ids.
pub fn check_queue_lines_unique(history: &History) -> InvariantResult {
    for entry in history.entries() {
        let HistoryEvent::QueueContent(queue) = &entry.event else {
            continue;
        };
        let distinct: HashSet<_> = queue.iter().collect();
        if distinct.len() != queue.len() {
            return Err(violation(
                "QueueLinesUnique",
                format!("node {} recorded queue {queue:?} at {:?}", history.node(), entry.at),
            ));
        }
    }
    Ok(())
}

/// Run every oracle over a set of histories, collecting all violations.
pub fn check_all(histories: &[History]) -> Result<(), Vec<Violation>> {
    let mut violations: Vec<Violation> = check_cs_timeline(histories).err().into_iter().collect();
    for history in histories {
        violations.extend(check_privilege_after_exit(history).err());
        violations.extend(check_queue_lines_unique(history).err());
    }

    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn history(id: u32, events: &[(u64, HistoryEvent)]) -> History {
        let mut history = History::new(NodeId(id));
        for (at, event) in events {
            history.record(ms(*at), event.clone());
        }
        history
    }

    #[test]
    fn sequential_sections_pass() {
        let a = history(0, &[(0, HistoryEvent::EnteredCs), (10, HistoryEvent::ExitedCs)]);
        let b = history(1, &[(10, HistoryEvent::EnteredCs), (20, HistoryEvent::ExitedCs)]);

        assert!(check_cs_timeline(&[b.clone(), a.clone()]).is_ok());
        assert!(check_all(&[a, b]).is_ok());
    }

    #[test]
    fn overlapping_sections_fail() {
        let a = history(0, &[(0, HistoryEvent::EnteredCs), (10, HistoryEvent::ExitedCs)]);
        let b = history(1, &[(5, HistoryEvent::EnteredCs), (15, HistoryEvent::ExitedCs)]);

        let violation = check_cs_timeline(&[a, b]).unwrap_err();
        assert_eq!(violation.invariant, "CsTimeline");
    }

    #[test]
    fn handoff_while_using_fails() {
        let bad = history(
            2,
            &[
                (0, HistoryEvent::EnteredCs),
                (1, HistoryEvent::Sent { kind: MessageKind::Privilege, to: NodeId(5) }),
                (2, HistoryEvent::ExitedCs),
            ],
        );
        assert!(check_privilege_after_exit(&bad).is_err());

        let good = history(
            2,
            &[
                (0, HistoryEvent::EnteredCs),
                (2, HistoryEvent::ExitedCs),
                (2, HistoryEvent::Sent { kind: MessageKind::Privilege, to: NodeId(5) }),
            ],
        );
        assert!(check_privilege_after_exit(&good).is_ok());
    }

    #[test]
    fn duplicate_queue_line_fails() {
        let bad = history(3, &[(0, HistoryEvent::QueueContent(vec![NodeId(7), NodeId(7)]))]);
        assert!(check_queue_lines_unique(&bad).is_err());
        assert_eq!(check_all(&[bad]).unwrap_err().len(), 1);
    }
}
