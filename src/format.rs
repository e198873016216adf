use regex::Regex;
use std::sync::LazyLock;

/// Line-break marker inserted into bot text for the browser to render.
pub const LINE_BREAK: &str = "<br>";

static POINT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s+").expect("point marker regex is valid"));

/// Reflow a webhook reply into display text.
///
/// Newlines become `<br>`. Text split on `N. ` markers is treated as a list
/// of points; a single point is returned without a number, several points
/// are renumbered from 1 and joined with `<br>`.
pub fn format_as_points(raw: &str) -> String {
    let with_breaks = raw.replace('\n', LINE_BREAK);
    let points: Vec<&str> = POINT_MARKER
        .split(&with_breaks)
        .map(trim_point)
        .filter(|point| !point.is_empty())
        .collect();

    match points.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        many => many
            .iter()
            .enumerate()
            .map(|(idx, point)| format!("{}. {}", idx + 1, point))
            .collect::<Vec<_>>()
            .join(LINE_BREAK),
    }
}

fn trim_point(mut point: &str) -> &str {
    loop {
        let trimmed = point.trim();
        let trimmed = trimmed.strip_prefix(LINE_BREAK).unwrap_or(trimmed);
        let trimmed = trimmed.strip_suffix(LINE_BREAK).unwrap_or(trimmed);
        if trimmed.len() == point.len() {
            return trimmed;
        }
        point = trimmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumbers_inline_points() {
        assert_eq!(format_as_points("1. a 2. b"), "1. a<br>2. b");
    }

    #[test]
    fn renumbers_from_one_regardless_of_source_numbers() {
        assert_eq!(
            format_as_points("Steps:\n4. open\n9. read\n"),
            "1. Steps:<br>2. open<br>3. read"
        );
    }

    #[test]
    fn plain_text_is_returned_trimmed() {
        assert_eq!(format_as_points("just text"), "just text");
        assert_eq!(format_as_points("  just text \n"), "just text");
    }

    #[test]
    fn single_point_keeps_inner_line_breaks() {
        assert_eq!(
            format_as_points("1. first line\nsecond line"),
            "first line<br>second line"
        );
    }

    #[test]
    fn decimals_are_not_markers() {
        assert_eq!(format_as_points("costs 3.5 dollars"), "costs 3.5 dollars");
    }

    #[test]
    fn empty_and_marker_only_input_is_total() {
        assert_eq!(format_as_points(""), "");
        assert_eq!(format_as_points("   "), "");
        assert_eq!(format_as_points("1. 2. \n"), "");
    }

    #[test]
    fn idempotent_on_plain_single_line() {
        let once = format_as_points("hello there");
        assert_eq!(format_as_points(&once), once);
    }
}
