//! Externally-sourced tabs: reload sources and the id-file format.

use crate::remote::TimelineKind;
use crate::strip::{Strip, StripKind};
use hashbrown::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Timelines keep at most this many strips unless told otherwise.
const TIMELINE_CAPACITY: usize = 200;

/// What a periodic tab reloads from the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicSource {
    Timeline(TimelineKind),
    Followers,
    Following,
}

impl PeriodicSource {
    /// Nominal reload period. A floor, not a promise: the rate-paced wait
    /// after each reload may stretch it.
    pub fn period(self) -> Duration {
        let seconds = match self {
            PeriodicSource::Timeline(TimelineKind::Public) => 2 * 60,
            PeriodicSource::Timeline(TimelineKind::Friends) => 10 * 60,
            PeriodicSource::Timeline(TimelineKind::User) => 4 * 60,
            PeriodicSource::Timeline(TimelineKind::Replies) => 2 * 60,
            PeriodicSource::Timeline(TimelineKind::Direct) => 3 * 60,
            PeriodicSource::Timeline(TimelineKind::DirectSent) => 60 * 60,
            PeriodicSource::Followers | PeriodicSource::Following => 60 * 60,
        };
        Duration::from_secs(seconds)
    }

    pub fn strip_kind(self) -> StripKind {
        match self {
            PeriodicSource::Timeline(_) => StripKind::Tweet,
            PeriodicSource::Followers | PeriodicSource::Following => StripKind::User,
        }
    }

    /// Cap on `preset_strips`; the greatest keys win. Follower sets are
    /// replaced wholesale on reload and carry no cap.
    pub fn capacity(self) -> Option<usize> {
        match self {
            PeriodicSource::Timeline(_) => Some(TIMELINE_CAPACITY),
            PeriodicSource::Followers | PeriodicSource::Following => None,
        }
    }

    /// Timelines accumulate into the preset set; follower sets replace it.
    pub fn accumulates(self) -> bool {
        matches!(self, PeriodicSource::Timeline(_))
    }

    pub(crate) fn name_base(self) -> &'static str {
        match self {
            PeriodicSource::Timeline(TimelineKind::Public) => "Public",
            PeriodicSource::Timeline(TimelineKind::Friends) => "Friends",
            PeriodicSource::Timeline(TimelineKind::User) => "User",
            PeriodicSource::Timeline(TimelineKind::Replies) => "Replies",
            PeriodicSource::Timeline(TimelineKind::Direct) => "Direct",
            PeriodicSource::Timeline(TimelineKind::DirectSent) => "DSent",
            PeriodicSource::Followers => "…ers",
            PeriodicSource::Following => "…ing",
        }
    }
}

/// Read an id file: one `str(strip)` per line, UTF-8, no header. Blank
/// lines are skipped; everything else round-trips verbatim as an opaque
/// strip.
pub(crate) fn read_id_file(path: &Path) -> io::Result<HashSet<Strip>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(Strip::opaque)
        .collect())
}

/// Write an id file, one strip per line in key order, `\n`-terminated.
pub(crate) fn write_id_file(path: &Path, strips: &HashSet<Strip>) -> io::Result<()> {
    let mut ordered: Vec<&Strip> = strips.iter().collect();
    ordered.sort();
    let mut out = BufWriter::new(File::create(path)?);
    for strip in ordered {
        writeln!(out, "{strip}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids");

        let strips: HashSet<Strip> = ["charlie", "alpha", "bravo"]
            .into_iter()
            .map(Strip::opaque)
            .collect();
        write_id_file(&path, &strips).unwrap();

        let loaded = read_id_file(&path).unwrap();
        assert_eq!(loaded, strips);

        // Sorted, newline-terminated, no header.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "alpha\nbravo\ncharlie\n");
    }

    #[test]
    fn blank_lines_are_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids");
        std::fs::write(&path, "one\n\ntwo\n   \nthree\n").unwrap();

        let loaded = read_id_file(&path).unwrap();
        let expected: HashSet<Strip> =
            ["one", "two", "three"].into_iter().map(Strip::opaque).collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(read_id_file(Path::new("/nonexistent/ids")).is_err());
    }

    #[test]
    fn periodic_sources_describe_themselves() {
        let friends = PeriodicSource::Timeline(TimelineKind::Friends);
        assert_eq!(friends.period(), Duration::from_secs(600));
        assert_eq!(friends.strip_kind(), StripKind::Tweet);
        assert_eq!(friends.capacity(), Some(200));
        assert!(friends.accumulates());

        assert_eq!(PeriodicSource::Followers.strip_kind(), StripKind::User);
        assert_eq!(PeriodicSource::Followers.capacity(), None);
        assert!(!PeriodicSource::Following.accumulates());
    }
}
