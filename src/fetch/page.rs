//! Section-page parsing.
//!
//! The course schedule renders a seat summary table whose rows end in a
//! count: total remaining, registered, general remaining, restricted
//! remaining. Pages for withdrawn sections say so in the body, and a
//! script-disabled wall is treated the same way.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::FetchError;

use super::{FetchOutcome, RawSeatCounts};

const MISSING_COURSE_TEXT: &str = "no longer offered";
const SCRIPT_WALL_TEXT: &str = "requires that you have Javascript enabled";
const SEAT_TABLE_MARKER: &str = "Seats Remaining";

struct PagePatterns {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
    body: Regex,
    hidden: Regex,
}

fn patterns() -> &'static PagePatterns {
    static PATTERNS: OnceLock<PagePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| PagePatterns {
        table: Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("table pattern"),
        row: Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row pattern"),
        cell: Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").expect("cell pattern"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("tag pattern"),
        body: Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").expect("body pattern"),
        hidden: Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<!--.*?-->")
            .expect("hidden content pattern"),
    })
}

fn text_of(fragment: &str) -> String {
    patterns()
        .tag
        .replace_all(fragment, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of the page body; scripts, styles and comments are skipped.
fn body_text(html: &str) -> String {
    let p = patterns();
    let body = p.body.captures(html).and_then(|c| c.get(1)).map_or(html, |m| m.as_str());
    text_of(&p.hidden.replace_all(body, " "))
}

/// Reads a section page into a [`FetchOutcome`].
pub fn parse_section_page(html: &str) -> Result<FetchOutcome, FetchError> {
    let text = body_text(html);
    if text.contains(MISSING_COURSE_TEXT) || text.contains(SCRIPT_WALL_TEXT) {
        return Ok(FetchOutcome::missing());
    }

    let p = patterns();
    let table = p
        .table
        .captures_iter(html)
        .map(|c| c.get(1).map_or("", |m| m.as_str()))
        .find(|body| text_of(body).contains(SEAT_TABLE_MARKER))
        .ok_or_else(|| FetchError::Parse {
            reason: "seat summary table not found".to_string(),
        })?;

    let counts: Vec<i64> = p
        .row
        .captures_iter(table)
        .filter_map(|row| {
            let last_cell = p.cell.captures_iter(&row[1]).last()?;
            text_of(&last_cell[1]).parse::<i64>().ok()
        })
        .take(4)
        .collect();

    let &[
        total_seats_remaining,
        total_registered,
        general_seats_remaining,
        restricted_seats_remaining,
    ] = counts.as_slice()
    else {
        return Err(FetchError::Parse {
            reason: format!("expected 4 seat counts, found {}", counts.len()),
        });
    };

    Ok(FetchOutcome {
        exists: true,
        counts: RawSeatCounts {
            total_seats_remaining,
            total_registered,
            general_seats_remaining,
            restricted_seats_remaining,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTION_PAGE: &str = r#"
        <html><body>
        <h4>CPSC 221 101</h4>
        <table class="table table-striped"><tr><td>Term</td><td>1</td></tr></table>
        <table class="'table">
          <tr><td colspan="2"><b>Seat Summary</b></td></tr>
          <tr><td width=200px>Total Seats Remaining:</td><td align=left><strong>4</strong></td></tr>
          <tr><td width=200px>Currently Registered:</td>
              <td align=left><strong>196</strong></td></tr>
          <tr><td width=200px>General Seats Remaining:</td>
              <td align=left><strong>3</strong></td></tr>
          <tr><td width=200px>Restricted Seats Remaining*:</td>
              <td align=left><strong>1</strong></td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn reads_seat_summary() {
        let outcome = parse_section_page(SECTION_PAGE).unwrap();
        assert_eq!(outcome, FetchOutcome::found(4, 196, 3, 1));
    }

    #[test]
    fn withdrawn_section_is_missing() {
        let page = "<html><body>The requested section is either no longer offered at UBC \
                    Vancouver or is not being offered this session.</body></html>";
        assert_eq!(parse_section_page(page).unwrap(), FetchOutcome::missing());
    }

    #[test]
    fn script_wall_is_missing() {
        let page = "<html><body>This site requires that you have Javascript enabled.</body></html>";
        assert!(!parse_section_page(page).unwrap().exists);
    }

    #[test]
    fn markers_outside_visible_text_are_ignored() {
        let page = SECTION_PAGE.replace(
            "<h4>",
            "<script>var msg = 'no longer offered';</script>\
             <!-- requires that you have Javascript enabled --><h4>",
        );
        assert_eq!(parse_section_page(&page).unwrap(), FetchOutcome::found(4, 196, 3, 1));
    }

    #[test]
    fn marker_split_across_markup_is_still_seen() {
        let page =
            "<html><body><p>This section is no\n   longer <em>offered</em>.</p></body></html>";
        assert!(!parse_section_page(page).unwrap().exists);
    }

    #[test]
    fn page_without_seat_table_is_a_parse_error() {
        let page = "<html><body><table><tr><td>Term</td><td>1</td></tr></table></body></html>";
        assert!(matches!(parse_section_page(page), Err(FetchError::Parse { .. })));
    }

    #[test]
    fn short_seat_table_is_a_parse_error() {
        let page = r#"<table><tr><td>Total Seats Remaining:</td><td>4</td></tr>
            <tr><td>Currently Registered:</td><td>196</td></tr></table>"#;
        let err = parse_section_page(page).unwrap_err();
        assert_eq!(
            err,
            FetchError::Parse {
                reason: "expected 4 seat counts, found 2".to_string()
            }
        );
    }

    #[test]
    fn negative_counts_pass_through_for_validation() {
        let page = r#"<table><tr><td>Total Seats Remaining:</td><td>-1</td></tr>
            <tr><td>Currently Registered:</td><td>201</td></tr>
            <tr><td>General Seats Remaining:</td><td>0</td></tr>
            <tr><td>Restricted Seats Remaining*:</td><td>0</td></tr></table>"#;
        let outcome = parse_section_page(page).unwrap();
        assert_eq!(outcome.counts.total_seats_remaining, -1);
        assert!(outcome.counts.validate().is_err());
    }
}
