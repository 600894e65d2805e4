use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const HEADER_COLUMNS: [&str; 4] = ["NAME", "VERSION", "STATUS", "COMMIT"];

/// Live state of one plugin as reported by `plugins.py list`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveStatusEntry {
    pub version: String,
    pub status: String,
    pub commit: String,
}

pub type LiveStatusMap = BTreeMap<String, LiveStatusEntry>;

fn header_matches(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    tokens
        .windows(HEADER_COLUMNS.len())
        .any(|window| window == &HEADER_COLUMNS[..])
}

/// Parses the fixed-column table printed by `plugins.py list`:
///
/// ```text
/// NAME            VERSION   STATUS     COMMIT
/// --------------------------------------------
/// holiday_lights  1.2.0     installed  3f2a9c1
/// ```
///
/// The header tokens are the only sync point with the table format. Rows with
/// fewer than four columns are skipped, and extra trailing columns are ignored.
pub fn parse_plugin_list(raw: &str) -> LiveStatusMap {
    let mut statuses = LiveStatusMap::new();
    let lines: Vec<&str> = raw.trim().lines().collect();

    if lines.len() <= 2 {
        tracing::warn!("could not parse plugin list output: no data lines found");
        return statuses;
    }

    if !header_matches(lines[0]) {
        tracing::warn!(header = lines[0], "could not parse plugin list header");
        return statuses;
    }

    for line in &lines[2..] {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let [name, version, status, commit, ..] = parts.as_slice() else {
            tracing::warn!(
                columns = parts.len(),
                line = *line,
                "could not parse plugin list line (expected 4 columns)"
            );
            continue;
        };

        statuses.insert(
            name.to_string(),
            LiveStatusEntry {
                version: version.to_string(),
                status: status.to_string(),
                commit: commit.to_string(),
            },
        );
    }

    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
NAME              VERSION    STATUS      COMMIT
------------------------------------------------
holiday_lights    1.2.0      installed   3f2a9c1
weather_plus      0.4.1      modified    a1b2c3d   (local changes)
";

    #[test]
    fn parses_rows_and_ignores_trailing_columns() {
        let map = parse_plugin_list(TABLE);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map["holiday_lights"],
            LiveStatusEntry {
                version: "1.2.0".to_string(),
                status: "installed".to_string(),
                commit: "3f2a9c1".to_string(),
            }
        );
        assert_eq!(map["weather_plus"].status, "modified");
        assert_eq!(map["weather_plus"].commit, "a1b2c3d");
    }

    #[test]
    fn malformed_header_yields_empty_map() {
        let raw = "PLUGIN  VER  STATE  SHA\n-----\nfoo 1.0 installed abc\n";
        assert!(parse_plugin_list(raw).is_empty());
    }

    #[test]
    fn short_row_is_skipped_but_later_rows_parse() {
        let raw = "\
NAME VERSION STATUS COMMIT
--------------------------
broken 1.0

good 2.0 installed deadbee
";
        let map = parse_plugin_list(raw);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("good"));
        assert!(!map.contains_key("broken"));
    }

    #[test]
    fn header_only_output_is_empty() {
        assert!(parse_plugin_list("NAME VERSION STATUS COMMIT\n-----\n").is_empty());
        assert!(parse_plugin_list("").is_empty());
    }

    #[test]
    fn separator_line_is_never_treated_as_data() {
        let raw = "NAME VERSION STATUS COMMIT\na b c d\nreal 1.0 installed abc\n";
        let map = parse_plugin_list(raw);
        assert!(!map.contains_key("a"));
        assert!(map.contains_key("real"));
    }
}
