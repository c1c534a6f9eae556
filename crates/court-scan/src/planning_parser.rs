use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::scan_types::{ProviderError, SlotObservation};

/// Class marking a free cell in the planning table
pub const FREE_SLOT_CLASS: &str = "table-planning--type--libre";

lazy_static! {
    static ref ROW_START_RE: Regex = Regex::new(r"(?i)<tr\b[^>]*>").unwrap();
    static ref ROW_END_RE: Regex =
        Regex::new(r"(?i)</(?:tr|thead|tbody|tfoot|table)\s*>").unwrap();
    static ref HEADER_RE: Regex = Regex::new(r"(?is)<th\b[^>]*>(.*?)</th>").unwrap();
    static ref CELL_RE: Regex = Regex::new(r"(?is)<td\b([^>]*)>").unwrap();
    static ref CLASS_RE: Regex = Regex::new(r#"(?i)\bclass\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref TIME_RE: Regex = Regex::new(r"^(\d{1,2})\s*[:hH]\s*(\d{2})$").unwrap();
    static ref TITLE_RE: Regex = Regex::new(
        r#"(?is)<[a-z0-9]+\b[^>]*\bclass\s*=\s*["'][^"']*\bplanning--title\b[^"']*["'][^>]*>(.*?)</[a-z0-9]+>"#
    )
    .unwrap();
    static ref FRENCH_DATE_RE: Regex =
        Regex::new(r"(?i)(\d{1,2})\s+([a-zàâçéèêëîïôûùüÿ]+)\s+(\d{4})").unwrap();
}

/// Slots extracted from one planning page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningPage {
    /// Date announced by the planning title, when it could be read
    pub date: Option<NaiveDate>,
    /// One entry per (time row, court column)
    pub slots: Vec<SlotObservation>,
}

/// Parse the planning table.
///
/// Rows are recognised by a time in their header cell; each data cell is one
/// court, named `Padel {n}` after its 1-based column. A page without any time
/// row is rejected rather than read as fully booked.
pub fn parse_planning(html: &str) -> Result<PlanningPage, ProviderError> {
    let mut slots = Vec::new();
    let mut time_rows = 0;

    for row_html in table_rows(html) {
        let Some(header) = HEADER_RE.captures(row_html) else {
            continue;
        };
        let Some(time) = parse_slot_time(&text_content(&header[1])) else {
            continue;
        };
        time_rows += 1;

        for (index, cell) in CELL_RE.captures_iter(row_html).enumerate() {
            let available = CLASS_RE
                .captures(&cell[1])
                .is_some_and(|class| class[1].split_whitespace().any(|c| c == FREE_SLOT_CLASS));

            slots.push(SlotObservation {
                court: format!("Padel {}", index + 1),
                time,
                available,
            });
        }
    }

    if time_rows == 0 {
        return Err(ProviderError::DataFormat(
            "planning contains no time slots".to_string(),
        ));
    }

    let date = TITLE_RE
        .captures(html)
        .and_then(|title| parse_title_date(&text_content(&title[1])));

    if date.is_none() {
        debug!("Planning title has no readable date");
    }

    Ok(PlanningPage { date, slots })
}

/// Inner markup of every table row. A row ends at its `</tr>`, or where the
/// next row or the enclosing section starts, since `</tr>` is optional in HTML.
fn table_rows(html: &str) -> Vec<&str> {
    let starts: Vec<(usize, usize)> = ROW_START_RE
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(index, &(_, content_start))| {
            let limit = starts.get(index + 1).map_or(html.len(), |&(next, _)| next);
            let segment = &html[content_start..limit];
            match ROW_END_RE.find(segment) {
                Some(end) => &segment[..end.start()],
                None => segment,
            }
        })
        .collect()
}

/// Parse a slot start such as `11:00`, `9h30` or `18 H 00`
pub fn parse_slot_time(text: &str) -> Option<NaiveTime> {
    let captures = TIME_RE.captures(text.trim())?;
    let hour = captures[1].parse().ok()?;
    let minute = captures[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Read the date of a title like `PLANNING PADEL DU lundi 06 janvier 2025`
pub fn parse_title_date(title: &str) -> Option<NaiveDate> {
    let captures = FRENCH_DATE_RE.captures(title)?;
    let day = captures[1].parse().ok()?;
    let month = french_month(&captures[2])?;
    let year = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn french_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "janvier" => 1,
        "février" | "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "août" | "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "décembre" | "decembre" => 12,
        _ => return None,
    };
    Some(month)
}

/// Strip tags and decode the few entities the planning uses
fn text_content(fragment: &str) -> String {
    TAG_RE
        .replace_all(fragment, " ")
        .replace("&nbsp;", " ")
        .replace("&eacute;", "é")
        .replace("&ucirc;", "û")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANNING: &str = r#"
<html><body>
  <div class="planning">
    <h2 class="planning--title">PLANNING PADEL DU lundi 06 janvier 2025</h2>
    <table class="table-planning">
      <thead><tr><th>Horaire</th><th>Padel 1</th><th>Padel 2</th><th>Padel 3</th></tr></thead>
      <tbody>
        <tr>
          <th scope="row">09:30</th>
          <td class="table-planning--type--reserve">Réservé</td>
          <td class="table-planning--type--reserve">Réservé</td>
          <td class="table-planning--type--reserve">Réservé</td>
        </tr>
        <tr class="even">
          <th><span>11h00</span></th>
          <td class="cell table-planning--type--libre"><a href="/book?c=1">Libre</a></td>
          <td class="table-planning--type--reserve">Réservé</td>
          <td class='table-planning--type--libre'>Libre</td>
        </tr>
      </tbody>
    </table>
  </div>
</body></html>
"#;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_planning() {
        let page = parse_planning(PLANNING).unwrap();

        assert_eq!(page.date, NaiveDate::from_ymd_opt(2025, 1, 6));
        assert_eq!(page.slots.len(), 6);

        let free: Vec<(&str, NaiveTime)> = page
            .slots
            .iter()
            .filter(|s| s.available)
            .map(|s| (s.court.as_str(), s.time))
            .collect();
        assert_eq!(free, vec![("Padel 1", time(11, 0)), ("Padel 3", time(11, 0))]);
        assert!(page.slots.iter().filter(|s| s.time == time(9, 30)).all(|s| !s.available));
    }

    #[test]
    fn test_page_without_time_rows_is_rejected() {
        let login_page = r#"<form action="/login"><input name="username"></form>"#;

        assert!(matches!(
            parse_planning(login_page),
            Err(ProviderError::DataFormat(_))
        ));
    }

    #[test]
    fn test_planning_without_title_has_no_date() {
        let html = r#"<table><tr><th>18:00</th><td class="table-planning--type--libre"></td></tr></table>"#;

        let page = parse_planning(html).unwrap();

        assert_eq!(page.date, None);
        assert_eq!(page.slots.len(), 1);
        assert!(page.slots[0].available);
    }

    #[test]
    fn test_rows_without_closing_tag() {
        let html = r#"<table><tbody>
<tr><th>10:00</th><td class="table-planning--type--libre"></td><td></td>
<tr><th>11:00</th><td></td><td class="table-planning--type--libre"></td>
</tbody></table>"#;

        let page = parse_planning(html).unwrap();
        let slots: Vec<(&str, NaiveTime, bool)> = page
            .slots
            .iter()
            .map(|s| (s.court.as_str(), s.time, s.available))
            .collect();

        assert_eq!(
            slots,
            vec![
                ("Padel 1", time(10, 0), true),
                ("Padel 2", time(10, 0), false),
                ("Padel 1", time(11, 0), false),
                ("Padel 2", time(11, 0), true),
            ]
        );
    }

    #[test]
    fn test_similar_class_names_are_not_free() {
        let html = r#"<table><tr><th>18:00</th><td class="table-planning--type--libre-soon"></td></tr></table>"#;

        assert!(!parse_planning(html).unwrap().slots[0].available);
    }

    #[test]
    fn test_parse_slot_time() {
        assert_eq!(parse_slot_time("11:00"), Some(time(11, 0)));
        assert_eq!(parse_slot_time(" 9h30 "), Some(time(9, 30)));
        assert_eq!(parse_slot_time("18 H 00"), Some(time(18, 0)));
        assert_eq!(parse_slot_time("25:00"), None);
        assert_eq!(parse_slot_time("Horaire"), None);
    }

    #[test]
    fn test_parse_title_date() {
        assert_eq!(
            parse_title_date("PLANNING PADEL DU mardi 17 février 2026"),
            NaiveDate::from_ymd_opt(2026, 2, 17)
        );
        assert_eq!(
            parse_title_date("PLANNING PADEL DU samedi 1 AOUT 2026"),
            NaiveDate::from_ymd_opt(2026, 8, 1)
        );
        assert_eq!(parse_title_date("PLANNING PADEL DU 31 février 2026"), None);
        assert_eq!(parse_title_date("PLANNING PADEL"), None);
    }

    #[test]
    fn test_title_entities_are_decoded() {
        let html = r#"<h1 class="planning--title">Planning du 3 d&eacute;cembre 2026</h1>
<table><tr><th>10:00</th><td></td></tr></table>"#;

        assert_eq!(
            parse_planning(html).unwrap().date,
            NaiveDate::from_ymd_opt(2026, 12, 3)
        );
    }
}
