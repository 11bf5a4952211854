//! HTML parser for tournament information pages
//!
//! A details page carries one or more `table.details_table` elements whose
//! rows pair a label cell (`td.info_table_l`) with a value cell. Rows with
//! unknown labels are ignored.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Fields extracted from one tournament information page
///
/// Every field is optional; fields missing on the page are omitted when
/// serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_players: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_registered: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_mult_round_days: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chief_arbiter: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deputy_chief_arbiter: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arbiter: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assistant_arbiter: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chief_organizer: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub organizer: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_championship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_report_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_report_text: Option<String>,
}

/// Parses a tournament information page
///
/// # Returns
///
/// * `Some(TournamentDetails)` - The page has at least one details table
/// * `None` - The expected structure is missing (a terminal failure)
///
/// # Example
///
/// ```
/// use tourney_harvest::crawler::parse_details;
///
/// let html = r#"<table class="details_table">
///     <tr><td class="info_table_l">City</td><td>Oslo</td></tr>
/// </table>"#;
/// let details = parse_details(html).unwrap();
/// assert_eq!(details.city.as_deref(), Some("Oslo"));
/// ```
pub fn parse_details(html: &str) -> Option<TournamentDetails> {
    let document = Html::parse_document(html);

    let table_selector = Selector::parse("table.details_table").ok()?;
    let row_selector = Selector::parse("tr").ok()?;
    let cell_selector = Selector::parse("td").ok()?;
    let link_selector = Selector::parse("a").ok()?;

    let mut tables = document.select(&table_selector).peekable();
    tables.peek()?;

    let mut details = TournamentDetails::default();

    for table in tables {
        for row in table.select(&row_selector) {
            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            if cells.len() < 2 {
                continue;
            }

            let Some(label_cell) = cells
                .iter()
                .find(|cell| cell.value().classes().any(|class| class == "info_table_l"))
            else {
                continue;
            };

            let label = collapse_text(*label_cell);
            let value_cell = cells[1];
            apply_field(&mut details, &label, value_cell, &link_selector);
        }
    }

    Some(details)
}

fn apply_field(details: &mut TournamentDetails, label: &str, cell: ElementRef, links: &Selector) {
    let text = || non_empty(cell_text(cell, links));
    let people = || link_texts(cell, links);
    let href = || first_href(cell, links);

    match label {
        "Event code" => details.event_code = text(),
        "Tournament Name" => details.tournament_name = text(),
        "City" => details.city = text(),
        "Country" => details.country = text(),
        "Number of players" => details.number_of_players = text(),
        "System" => details.system = text(),
        "Hybrid" => details.hybrid = text(),
        "Category" => details.category = text(),
        "Start Date" => details.start_date = text(),
        "End Date" => details.end_date = text(),
        "Date received" => details.date_received = text(),
        "Date registered" => details.date_registered = text(),
        "Type" => details.kind = text(),
        "Time Control" => details.time_control = text(),
        "Zone" => details.zone = text(),
        "Reported mult. round days" => details.reported_mult_round_days = text(),
        "Nat. Championship" => details.nat_championship = text(),
        "Chief Arbiter" => details.chief_arbiter = people(),
        "Deputy Chief Arbiter" => details.deputy_chief_arbiter = people(),
        "Arbiter" => details.arbiter = people(),
        "Assistant Arbiter" => details.assistant_arbiter = people(),
        "Chief Organizer" => details.chief_organizer = people(),
        "Organizer" => details.organizer = people(),
        "PGN file" => details.pgn_file = text(),
        "Orig.Report" => details.orig_report = href(),
        "View Report" => {
            details.view_report_href = href();
            details.view_report_text = text();
        }
        _ => {}
    }
}

/// Text of a value cell
///
/// Anchor texts come first, followed by any text outside the anchors.
fn cell_text(cell: ElementRef, links: &Selector) -> String {
    let anchors = link_texts(cell, links);
    if anchors.is_empty() {
        return collapse_text(cell);
    }

    let mut parts = anchors;
    let remaining = text_outside_links(cell);
    if !remaining.is_empty() {
        parts.push(remaining);
    }
    parts.join(" ")
}

fn link_texts(cell: ElementRef, links: &Selector) -> Vec<String> {
    cell.select(links)
        .map(collapse_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn first_href(cell: ElementRef, links: &Selector) -> Option<String> {
    cell.select(links)
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
}

fn text_outside_links(cell: ElementRef) -> String {
    let mut text = String::new();
    push_text_outside_links(cell, &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_text_outside_links(element: ElementRef, text: &mut String) {
    for child in element.children() {
        if let Some(fragment) = child.value().as_text() {
            text.push_str(fragment);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if child_element.value().name() != "a" {
                push_text_outside_links(child_element, text);
            }
        }
    }
}

fn collapse_text(element: ElementRef) -> String {
    let raw = element.text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details_page(rows: &str) -> String {
        format!(
            r#"<html><head><title>Tournament</title></head><body>
            <table class="details_table">{}</table>
            </body></html>"#,
            rows
        )
    }

    #[test]
    fn test_missing_table_is_none() {
        let html = r#"<html><body><p>No tournament</p></body></html>"#;
        assert!(parse_details(html).is_none());
    }

    #[test]
    fn test_empty_table_yields_empty_details() {
        let details = parse_details(&details_page("")).unwrap();
        assert_eq!(details, TournamentDetails::default());
    }

    #[test]
    fn test_plain_fields() {
        let html = details_page(
            r#"
            <tr><td class="info_table_l">Event code</td><td>368123</td></tr>
            <tr><td class="info_table_l">Tournament Name</td><td>  Oslo   Open  </td></tr>
            <tr><td class="info_table_l">City</td><td>Oslo</td></tr>
            <tr><td class="info_table_l">Type</td><td>Swiss</td></tr>
            <tr><td class="info_table_l">Start Date</td><td>2024-03-01</td></tr>
            "#,
        );
        let details = parse_details(&html).unwrap();

        assert_eq!(details.event_code.as_deref(), Some("368123"));
        assert_eq!(details.tournament_name.as_deref(), Some("Oslo Open"));
        assert_eq!(details.city.as_deref(), Some("Oslo"));
        assert_eq!(details.kind.as_deref(), Some("Swiss"));
        assert_eq!(details.start_date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_people_fields_collect_link_texts() {
        let html = details_page(
            r#"
            <tr><td class="info_table_l">Arbiter</td>
                <td><a href="/p/1">Jane Doe</a>, <a href="/p/2">John Roe</a></td></tr>
            <tr><td class="info_table_l">Organizer</td><td>No links here</td></tr>
            "#,
        );
        let details = parse_details(&html).unwrap();

        assert_eq!(details.arbiter, vec!["Jane Doe", "John Roe"]);
        assert!(details.organizer.is_empty());
    }

    #[test]
    fn test_link_fields_take_href() {
        let html = details_page(
            r#"
            <tr><td class="info_table_l">Orig.Report</td>
                <td><a href="/report.phtml?id=9">download</a></td></tr>
            <tr><td class="info_table_l">View Report</td>
                <td><a href="/view.phtml?event=9">View</a> (updated)</td></tr>
            "#,
        );
        let details = parse_details(&html).unwrap();

        assert_eq!(details.orig_report.as_deref(), Some("/report.phtml?id=9"));
        assert_eq!(details.view_report_href.as_deref(), Some("/view.phtml?event=9"));
        assert_eq!(details.view_report_text.as_deref(), Some("View (updated)"));
    }

    #[test]
    fn test_rows_without_label_class_are_ignored() {
        let html = details_page(
            r#"
            <tr><td>City</td><td>Bergen</td></tr>
            <tr><td class="info_table_l">Country</td></tr>
            "#,
        );
        let details = parse_details(&html).unwrap();
        assert!(details.city.is_none());
        assert!(details.country.is_none());
    }

    #[test]
    fn test_serialization_omits_missing_fields() {
        let details = TournamentDetails {
            city: Some("Oslo".to_string()),
            kind: Some("Swiss".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&details).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 2);
        assert_eq!(json["city"], "Oslo");
        assert_eq!(json["type"], "Swiss");
    }
}
