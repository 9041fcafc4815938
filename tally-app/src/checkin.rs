//! Check-in log parsing.
//!
//! Each line looks like `[<when>] <name>: <text>`. A text mentioning 暢想/畅想
//! is a meeting check-in; otherwise one mentioning 簽到/签到 is a daily
//! check-in. Anything else is rejected so typos don't silently vanish.
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tally_common::{Result, TallyError};

static LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\] (.*): (.*)").expect("check-in regex"));

const MEETING_MARKERS: [&str; 2] = ["暢想", "畅想"];
const DAILY_MARKERS: [&str; 2] = ["簽到", "签到"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckinCount {
    pub daily: u32,
    pub meeting: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckinKind {
    Daily,
    Meeting,
}

fn classify(text: &str) -> Option<CheckinKind> {
    if MEETING_MARKERS.iter().any(|m| text.contains(m)) {
        Some(CheckinKind::Meeting)
    } else if DAILY_MARKERS.iter().any(|m| text.contains(m)) {
        Some(CheckinKind::Daily)
    } else {
        None
    }
}

/// Per-member check-in totals for one log.
#[derive(Debug, Clone, Default)]
pub struct CheckinStats {
    by_name: HashMap<String, CheckinCount>,
}

impl CheckinStats {
    pub fn parse(log: &str) -> Result<Self> {
        let mut stats = Self::default();
        for (idx, raw) in log.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let caps = LINE.captures(line).ok_or_else(|| {
                TallyError::Input(format!("invalid check-in line {}: {line}", idx + 1))
            })?;
            let name = caps[1].to_string();
            let kind = classify(&caps[2]).ok_or_else(|| {
                TallyError::Input(format!("unrecognized check-in text on line {}: {line}", idx + 1))
            })?;

            let entry = stats.by_name.entry(name).or_default();
            match kind {
                CheckinKind::Daily => entry.daily += 1,
                CheckinKind::Meeting => entry.meeting += 1,
            }
        }
        tracing::debug!(members = stats.by_name.len(), "checkin.parsed");
        Ok(stats)
    }

    /// Totals for `name`; zero when the member never checked in.
    pub fn get(&self, name: &str) -> CheckinCount {
        self.by_name.get(name).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}
