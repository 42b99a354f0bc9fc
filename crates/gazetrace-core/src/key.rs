//! Session identity and the on-disk paths derived from it.

use std::fmt;
use std::path::{Path, PathBuf};

/// A (participant, test) pair. At most one live session exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub participant: String,
    pub test: u32,
}

impl SessionKey {
    pub fn new(participant: impl Into<String>, test: u32) -> Self {
        Self {
            participant: participant.into(),
            test,
        }
    }

    /// File stem shared by the record stream and the summary.
    ///
    /// Example: `metrics_p1_test3`
    pub fn file_stem(&self) -> String {
        format!(
            "metrics_{}_test{}",
            encode_component(&self.participant),
            self.test
        )
    }

    /// Path of the per-sample CSV stream under `data_dir`.
    pub fn record_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.csv", self.file_stem()))
    }

    /// Path of the summary JSON under `data_dir`.
    pub fn summary_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}_summary.json", self.file_stem()))
    }

    /// Recover a key from a record stream file name such as
    /// `metrics_p1_test3.csv`.
    pub fn from_record_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(".csv")?.strip_prefix("metrics_")?;
        let (participant, test) = stem.rsplit_once("_test")?;
        Some(Self::new(decode_component(participant)?, test.parse().ok()?))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/test{}", self.participant, self.test)
    }
}

impl<S: Into<String>> From<(S, u32)> for SessionKey {
    fn from((participant, test): (S, u32)) -> Self {
        Self::new(participant, test)
    }
}

/// Encode a participant id as part of a file name.
///
/// ASCII alphanumerics, `-` and `.` pass through; every other byte, `_`
/// included, becomes `_xx` (lowercase hex). The mapping is one-to-one, and
/// `_` is always followed by a hex digit, so `_test` in a stem can only be
/// the test separator.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("_{b:02x}"));
        }
    }
    out
}

fn decode_component(encoded: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut rest = encoded.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b == b'_' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            if !hex.bytes().all(|h| matches!(h, b'0'..=b'9' | b'a'..=b'f')) {
                return None;
            }
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(b);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}
