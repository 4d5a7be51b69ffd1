//! Maven version semantics: snapshot detection, timestamped snapshot builds and
//! version ordering used for `maven-metadata.xml`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// Literal suffix of a floating snapshot version.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// `<base>-<yyyyMMdd.HHmmss>-<build>`
static TIMESTAMPED_SNAPSHOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+)-(\d{8}\.\d{6})-(\d+)$")
        .expect("Timestamped snapshot regex should compile - this is a static pattern")
});

/// A deployed snapshot build such as `1.0-20240101.120000-3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBuild {
    pub base: String,
    pub timestamp: String,
    pub build_number: u32,
}

impl SnapshotBuild {
    pub fn parse(version: &str) -> Option<Self> {
        let caps = TIMESTAMPED_SNAPSHOT.captures(version)?;
        Some(SnapshotBuild {
            base: caps[1].to_string(),
            timestamp: caps[2].to_string(),
            build_number: caps[3].parse().ok()?,
        })
    }

    /// The floating version this build belongs to (`1.0-SNAPSHOT`).
    pub fn floating_version(&self) -> String {
        format!("{}{}", self.base, SNAPSHOT_SUFFIX)
    }

    /// Ordering key for picking the newest build.
    pub fn sort_key(&self) -> (&str, u32) {
        (&self.timestamp, self.build_number)
    }
}

/// True for floating snapshots (case-insensitive `-SNAPSHOT`) and timestamped builds.
pub fn is_snapshot(version: &str) -> bool {
    is_floating_snapshot(version) || SnapshotBuild::parse(version).is_some()
}

/// True only for the `-SNAPSHOT` alias itself.
pub fn is_floating_snapshot(version: &str) -> bool {
    version.len() > SNAPSHOT_SUFFIX.len()
        && version
            .get(version.len() - SNAPSHOT_SUFFIX.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(SNAPSHOT_SUFFIX))
}

/// True for a floating snapshot spelled with the canonical `-SNAPSHOT`, the
/// only spelling timestamped builds are stored under.
pub fn is_canonical_floating_snapshot(version: &str) -> bool {
    version.len() > SNAPSHOT_SUFFIX.len() && version.ends_with(SNAPSHOT_SUFFIX)
}

/// The version directory an artifact lives in.
///
/// Timestamped builds are stored under their floating version; every other
/// version is its own directory.
pub fn base_version(version: &str) -> String {
    match SnapshotBuild::parse(version) {
        Some(build) => build.floating_version(),
        None => version.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" | "a" => 1,
        "beta" | "b" => 2,
        "milestone" | "m" => 3,
        "rc" | "cr" => 4,
        "snapshot" => 5,
        "" | "ga" | "final" | "release" => 6,
        "sp" => 7,
        _ => 8,
    }
}

fn flush_item(current: &mut String, numeric: bool, items: &mut Vec<Item>) {
    if current.is_empty() {
        return;
    }
    let item = if numeric {
        current
            .parse()
            .map(Item::Number)
            .unwrap_or_else(|_| Item::Qualifier(current.clone()))
    } else {
        Item::Qualifier(current.to_ascii_lowercase())
    };
    items.push(item);
    current.clear();
}

fn tokenize(version: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    for c in version.chars() {
        if c == '.' || c == '-' || c == '_' {
            flush_item(&mut current, numeric, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != numeric {
            flush_item(&mut current, numeric, &mut items);
        }
        numeric = is_digit;
        current.push(c);
    }
    flush_item(&mut current, numeric, &mut items);

    // 1.0.0 == 1.0 == 1
    while matches!(items.last(), Some(Item::Number(0))) {
        items.pop();
    }
    items
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(x)), Some(Item::Number(y))) => x.cmp(y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => qualifier_rank(x)
            .cmp(&qualifier_rank(y))
            .then_with(|| x.cmp(y)),
        (Some(Item::Number(0)), None) | (None, Some(Item::Number(0))) => Ordering::Equal,
        (Some(Item::Number(_)), None) => Ordering::Greater,
        (None, Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), None) => qualifier_rank(x).cmp(&qualifier_rank("")),
        (None, Some(Item::Qualifier(y))) => qualifier_rank("").cmp(&qualifier_rank(y)),
    }
}

/// Compare two versions the way Maven orders them, close enough for picking the
/// latest and latest release: numeric parts compare numerically and qualifiers
/// rank `alpha < beta < milestone < rc < snapshot < release < sp`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ordering = compare_items(left.get(i), right.get(i));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_detection() {
        assert!(is_snapshot("1.0-SNAPSHOT"));
        assert!(is_snapshot("1.0-snapshot"));
        assert!(is_snapshot("1.0-20240101.120000-1"));
        assert!(!is_snapshot("1.0.0"));
        assert!(!is_snapshot("SNAPSHOT"));
        assert!(!is_snapshot("-SNAPSHOT"));
        assert!(!is_snapshot("20240101.120000-1"));
    }

    #[test]
    fn test_base_version() {
        assert_eq!(base_version("1.0-20240101.120000-7"), "1.0-SNAPSHOT");
        assert_eq!(base_version("1.0-SNAPSHOT"), "1.0-SNAPSHOT");
        assert_eq!(base_version("2.3.1"), "2.3.1");
    }

    #[test]
    fn test_snapshot_build_parse() {
        let build = SnapshotBuild::parse("2.1-beta-20240102.030405-12").unwrap();
        assert_eq!(build.base, "2.1-beta");
        assert_eq!(build.timestamp, "20240102.030405");
        assert_eq!(build.build_number, 12);
        assert!(SnapshotBuild::parse("1.0-SNAPSHOT").is_none());
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("1.0-SNAPSHOT", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0-alpha-1", "1.0-beta"), Ordering::Less);
        assert_eq!(compare_versions("1.0-rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0-sp1", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
    }
}
