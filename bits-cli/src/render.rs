//! Plain-text rendering for terminal output.

use bits_core::models::{Bit, Child};
use bits_core::palette;
use bits_core::MonthGroup;
use chrono::{Datelike, NaiveDate};

/// Longest text preview shown per bit in listings.
const PREVIEW_CHARS: usize = 120;

pub fn preview(text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut out: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if first_line.chars().count() > PREVIEW_CHARS || text.lines().filter(|l| !l.trim().is_empty()).count() > 1 {
        out.push('…');
    }
    out
}

pub fn render_bit(bit: &Bit) -> String {
    let mut line = format!("  {}  ", bit.effective_date().format("%b %e"));
    if let Some(child) = &bit.child {
        line.push_str(&format!("[{}] {} · ", palette::initials(&child.name), child.name));
    }
    line.push_str(&preview(&bit.text));
    if let Some(context) = &bit.context {
        line.push_str(&format!(" ({})", context));
    }
    if bit.has_photo() {
        line.push_str(" [photo]");
    }
    line.push_str(&format!("  #{}", short_id(&bit.id.to_string())));
    line
}

pub fn render_groups(groups: &[MonthGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("== {} ==\n", group.label));
        for bit in &group.bits {
            out.push_str(&render_bit(bit));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

pub fn footer(shown: usize, total: Option<u64>, has_more: bool) -> String {
    let mut line = match total {
        Some(total) => format!("Showing {} of {} bits", shown, total),
        None => format!("Showing {} bits", shown),
    };
    if has_more {
        line.push_str(" (more available, raise --pages)");
    }
    line
}

/// Whole years and months between `birthdate` and `today`, e.g. "2y 3m".
pub fn age_label(birthdate: NaiveDate, today: NaiveDate) -> String {
    let mut months = (today.year() - birthdate.year()) * 12 + today.month() as i32
        - birthdate.month() as i32;
    if today.day() < birthdate.day() {
        months -= 1;
    }
    let months = months.max(0);
    match (months / 12, months % 12) {
        (0, m) => format!("{}m", m),
        (y, 0) => format!("{}y", y),
        (y, m) => format!("{}y {}m", y, m),
    }
}

pub fn render_child(child: &Child, today: NaiveDate) -> String {
    let color = palette::color_name(&child.color).unwrap_or(child.color.as_str());
    format!(
        "[{}] {}  born {} ({})  {}  {}",
        palette::initials(&child.name),
        child.name,
        child.birthdate,
        age_label(child.birthdate, today),
        color,
        child.id
    )
}

/// Resolve a palette name such as "teal" to its stored value. Unknown names
/// pass through unchanged.
pub fn resolve_color(input: &str) -> String {
    palette::CHILD_COLORS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(input.trim()))
        .map(|c| c.value.to_string())
        .unwrap_or_else(|| input.trim().to_string())
}

fn short_id(id: &str) -> String {
    id.replace('-', "").chars().take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bits_core::group_by_month;
    use bits_core::models::ChildSummary;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mock_bit(text: &str, bit_date: NaiveDate) -> Bit {
        let created = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        Bit {
            id: Uuid::parse_str("7b5c24ab-1234-5678-9abc-def012345678").unwrap(),
            user_id: Uuid::nil(),
            child_id: None,
            text: text.to_string(),
            context: None,
            photo_url: None,
            bit_date: Some(bit_date),
            created_at: created,
            updated_at: created,
            child: None,
        }
    }

    // ========================================================================
    // TEST 1: bit line carries date, child badge, photo marker and short id
    // ========================================================================
    #[test]
    fn test_render_bit_line() {
        let mut bit = mock_bit("said \"dog\" for the first time", date(2024, 3, 9));
        bit.photo_url = Some("https://cdn.example/a.jpg".into());
        bit.context = Some("at the park".into());
        bit.child = Some(ChildSummary {
            id: Uuid::nil(),
            name: "Maya Rose".into(),
            color: palette::CHILD_COLORS[1].value.into(),
            photo_url: None,
        });

        let line = render_bit(&bit);
        assert!(line.starts_with("  Mar  9  [MR] Maya Rose · said"), "got: {}", line);
        assert!(line.contains("(at the park)"));
        assert!(line.contains("[photo]"));
        assert!(line.ends_with("#7b5c24"));
    }

    // ========================================================================
    // TEST 2: long or multi-line text is cut with an ellipsis
    // ========================================================================
    #[test]
    fn test_preview_truncation() {
        let long = "a".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 1);
        assert!(p.ends_with('…'));

        assert_eq!(preview("\nfirst\nsecond"), "first…");
        assert_eq!(preview("short"), "short");
    }

    // ========================================================================
    // TEST 3: groups render under month headers in order
    // ========================================================================
    #[test]
    fn test_render_groups_headers() {
        let bits = vec![
            mock_bit("april", date(2024, 4, 2)),
            mock_bit("march", date(2024, 3, 30)),
        ];
        let text = render_groups(&group_by_month(&bits));
        let april = text.find("== April 2024 ==").unwrap();
        let march = text.find("== March 2024 ==").unwrap();
        assert!(april < march);
    }

    // ========================================================================
    // TEST 4: footer reports totals and whether more pages exist
    // ========================================================================
    #[test]
    fn test_footer() {
        assert_eq!(footer(20, Some(45), true), "Showing 20 of 45 bits (more available, raise --pages)");
        assert_eq!(footer(5, None, false), "Showing 5 bits");
    }

    // ========================================================================
    // TEST 5: age label counts whole months
    // ========================================================================
    #[test]
    fn test_age_label() {
        let today = date(2024, 6, 1);
        assert_eq!(age_label(date(2024, 1, 15), today), "4m");
        assert_eq!(age_label(date(2021, 6, 1), today), "3y");
        assert_eq!(age_label(date(2021, 4, 12), today), "3y 1m");
    }

    // ========================================================================
    // TEST 6: palette names resolve case-insensitively
    // ========================================================================
    #[test]
    fn test_resolve_color() {
        assert_eq!(resolve_color("teal"), "hsl(180, 90%, 40%)");
        assert_eq!(resolve_color(" Sky Blue "), "hsl(200, 95%, 48%)");
        assert_eq!(resolve_color("#ff00aa"), "#ff00aa");
    }
}
