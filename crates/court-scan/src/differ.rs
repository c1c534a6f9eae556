use tracing::{debug, warn};

use crate::scan_types::*;
use crate::state_store::StateStore;

/// Result of comparing one snapshot with the stored state
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// Number of slots in the snapshot
    pub observed: usize,
    /// Slots that went from unknown or unavailable to available
    pub newly_available: usize,
    /// Newly available slots matching the window and court scope
    pub qualifying: usize,
    /// Email to send, if the policy allows one
    pub event: Option<NotificationEvent>,
}

/// Detects openings by comparing fresh snapshots with the [`StateStore`]
#[derive(Debug, Clone, Default)]
pub struct AvailabilityDiffer {
    policy: NotificationPolicy,
}

impl AvailabilityDiffer {
    /// Create a differ applying `policy`
    pub fn new(policy: NotificationPolicy) -> Self {
        Self { policy }
    }

    /// Policy in force
    pub fn policy(&self) -> NotificationPolicy {
        self.policy
    }

    /// Compare `snapshot` with the store and record it.
    ///
    /// Every observed slot is written back, qualifying or not. Slots missing
    /// from the snapshot keep their stored status.
    pub fn diff(
        &self,
        tracked: &TrackedDate,
        snapshot: &AvailabilitySnapshot,
        store: &mut StateStore,
    ) -> DiffOutcome {
        if snapshot.date != tracked.date {
            warn!(
                "Ignoring snapshot for {} while checking {}",
                snapshot.date, tracked.date
            );
            return DiffOutcome::default();
        }

        let mut outcome = DiffOutcome {
            observed: snapshot.slots.len(),
            ..DiffOutcome::default()
        };
        let mut qualifying = Vec::new();

        for slot in &snapshot.slots {
            let previous = store.get_status(&slot.court, tracked.date, slot.time).cloned();
            let newly_available =
                slot.available && previous.as_ref().is_none_or(|prev| !prev.available);

            if newly_available {
                outcome.newly_available += 1;

                if tracked.window.contains(slot.time) && tracked.courts.includes(&slot.court) {
                    qualifying.push(QualifyingSlot {
                        court: slot.court.clone(),
                        time: slot.time,
                        previous,
                    });
                }
            }

            store.set_status(CourtSlotStatus {
                court: slot.court.clone(),
                date: tracked.date,
                time: slot.time,
                available: slot.available,
                observed_at: snapshot.fetched_at,
            });
        }

        outcome.qualifying = qualifying.len();

        if qualifying.is_empty() {
            return outcome;
        }

        if self.policy == NotificationPolicy::OncePerDate && store.is_date_known(tracked.date) {
            debug!(
                "{} new slots on {} not announced, date already notified",
                qualifying.len(),
                tracked.date
            );
            return outcome;
        }

        outcome.event = Some(NotificationEvent {
            date: tracked.date,
            slots: qualifying,
            detected_at: snapshot.fetched_at,
        });
        outcome
    }

    /// Put the slots of an undelivered event back to their previous status,
    /// so the same observation qualifies again on the next cycle
    pub fn revert(&self, event: &NotificationEvent, store: &mut StateStore) {
        for slot in &event.slots {
            match &slot.previous {
                Some(previous) => store.set_status(previous.clone()),
                None => {
                    store.remove_status(&slot.court, event.date, slot.time);
                }
            }
        }
    }
}
