use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveTime;

use crate::scan_types::NotificationEvent;

/// Subject and plain-text body of a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Email subject
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Render an event as an email.
///
/// Slots are grouped by start time in ascending order, with the courts of
/// each time sorted, so the same event always renders the same text.
pub fn render_notification(event: &NotificationEvent, booking_url: Option<&str>) -> NotificationMessage {
    let subject = format!(
        "New padel slots available on {}",
        event.date.format("%A %d/%m/%Y")
    );

    let mut courts_by_time: BTreeMap<NaiveTime, BTreeSet<&str>> = BTreeMap::new();
    for slot in &event.slots {
        courts_by_time
            .entry(slot.time)
            .or_default()
            .insert(slot.court.as_str());
    }

    let slot_list = courts_by_time
        .iter()
        .map(|(time, courts)| {
            format!(
                "- {} : {}",
                time.format("%H:%M"),
                courts.iter().copied().collect::<Vec<_>>().join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let booking_line = booking_url
        .map(|url| format!("\nBook now: {}\n", url))
        .unwrap_or_default();

    let body = format!(
        r#"New padel slots are available!

{}
{}
{}
Detected at {}
"#,
        event.date.format("%A %d/%m/%Y"),
        slot_list,
        booking_line,
        event.detected_at.format("%Y-%m-%d %H:%M UTC")
    );

    NotificationMessage { subject, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_types::QualifyingSlot;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn slot(court: &str, h: u32, m: u32) -> QualifyingSlot {
        QualifyingSlot {
            court: court.to_string(),
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            previous: None,
        }
    }

    fn event(slots: Vec<QualifyingSlot>) -> NotificationEvent {
        NotificationEvent {
            date: NaiveDate::from_ymd_opt(2026, 10, 24).unwrap(),
            slots,
            detected_at: Utc.with_ymd_and_hms(2026, 10, 19, 9, 5, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_groups_by_time() {
        let message = render_notification(
            &event(vec![
                slot("Padel 3", 11, 30),
                slot("Padel 2", 10, 0),
                slot("Padel 1", 11, 30),
            ]),
            Some("https://club.example/planning"),
        );

        assert_eq!(message.subject, "New padel slots available on Saturday 24/10/2026");
        assert_eq!(
            message.body,
            "New padel slots are available!\n\
             \n\
             Saturday 24/10/2026\n\
             - 10:00 : Padel 2\n\
             - 11:30 : Padel 1, Padel 3\n\
             \n\
             Book now: https://club.example/planning\n\
             \n\
             Detected at 2026-10-19 09:05 UTC\n"
        );
    }

    #[test]
    fn test_render_is_independent_of_slot_order() {
        let a = render_notification(&event(vec![slot("Padel 1", 10, 0), slot("Padel 2", 10, 0)]), None);
        let b = render_notification(&event(vec![slot("Padel 2", 10, 0), slot("Padel 1", 10, 0)]), None);

        assert_eq!(a, b);
        assert!(!a.body.contains("Book now"));
    }
}
