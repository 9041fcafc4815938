//! Team roster document: teams → sub-teams → members.
//!
//! Only the fields the report touches are typed; everything else is carried
//! through unchanged so the output can replace the input file.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tally_common::{Result, TallyError};
use tally_social::twitter::TweetCounts;

use crate::checkin::CheckinStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub sub_teams: Vec<SubTeam>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTeam {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stats: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One dated entry appended to a member's `stats`.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStats {
    pub timestamp: String,
    pub week: String,
    pub twitter: Option<u64>,
    pub gettr: String,
    pub daily_checkin: u32,
    pub meeting_checkin: u32,
}

impl Roster {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| TallyError::Input(format!("invalid roster: {e}")))
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.teams
            .iter()
            .flat_map(|t| &t.sub_teams)
            .flat_map(|s| &s.members)
    }

    fn members_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.teams
            .iter_mut()
            .flat_map(|t| &mut t.sub_teams)
            .flat_map(|s| &mut s.members)
    }

    /// Distinct Twitter handles in roster order.
    pub fn twitter_handles(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.members()
            .filter_map(|m| m.twitter.as_deref())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .filter(|h| seen.insert(h.to_ascii_lowercase()))
            .map(str::to_string)
            .collect()
    }

    /// Append a stats entry for `now` to every member, keeping each list
    /// ordered by timestamp.
    pub fn append_stats<Tz>(
        &mut self,
        now: &DateTime<Tz>,
        counts: &TweetCounts,
        checkins: &CheckinStats,
    ) where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let timestamp = now.format("%Y/%m/%d/%a").to_string();
        let week = now.format("%G/%V").to_string();

        // The API echoes canonical casing, which may differ from the roster.
        let by_handle: HashMap<String, u64> = counts
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
            .collect();

        for member in self.members_mut() {
            let twitter = member
                .twitter
                .as_deref()
                .and_then(|h| by_handle.get(&h.trim().to_ascii_lowercase()).copied());
            let checkin = checkins.get(&member.name);
            let entry = MemberStats {
                timestamp: timestamp.clone(),
                week: week.clone(),
                twitter,
                gettr: "0".to_string(),
                daily_checkin: checkin.daily,
                meeting_checkin: checkin.meeting,
            };
            match serde_json::to_value(&entry) {
                Ok(value) => member.stats.push(value),
                Err(e) => tracing::warn!(member = %member.name, error = %e, "roster.stats.encode_failed"),
            }
            member
                .stats
                .sort_by(|a, b| stat_timestamp(a).cmp(stat_timestamp(b)));
        }
    }
}

fn null_as_empty<'de, D>(de: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(de)?.unwrap_or_default())
}

fn stat_timestamp(v: &Value) -> &str {
    v.get("timestamp").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample() -> Roster {
        Roster::from_json(
            &json!([
                {
                    "team_id": 1,
                    "sub_teams": [
                        { "name": "north", "members": [
                            { "name": "Alice", "twitter": "alice", "discord": "a#1" },
                            { "name": "Bob", "twitter": "Bob_X", "stats": [
                                { "timestamp": "2099/01/01/Thu", "twitter": 1 }
                            ] }
                        ] }
                    ]
                },
                {
                    "team_id": 2,
                    "sub_teams": [
                        { "members": [
                            { "name": "Carol" },
                            { "name": "Alice again", "twitter": "ALICE" }
                        ] }
                    ]
                }
            ])
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn handles_are_distinct_and_ordered() {
        assert_eq!(sample().twitter_handles(), vec!["alice", "Bob_X"]);
    }

    #[test]
    fn appends_dated_stats_for_every_member() {
        let mut roster = sample();
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let counts: TweetCounts = [("Alice".to_string(), 42), ("bob_x".to_string(), 7)].into();
        let checkins = CheckinStats::parse("[t] Alice: 签到\n[t] Alice: 畅想").unwrap();

        roster.append_stats(&now, &counts, &checkins);

        let members: Vec<&Member> = roster.members().collect();
        assert_eq!(
            members[0].stats,
            vec![json!({
                "timestamp": "2024/05/06/Mon",
                "week": "2024/19",
                "twitter": 42,
                "gettr": "0",
                "daily_checkin": 1,
                "meeting_checkin": 1
            })]
        );
        // Existing future entry stays last after sorting.
        assert_eq!(members[1].stats.len(), 2);
        assert_eq!(members[1].stats[0]["twitter"], json!(7));
        assert_eq!(members[1].stats[1]["timestamp"], json!("2099/01/01/Thu"));
        // No handle means no count, not a failure.
        assert_eq!(members[2].stats[0]["twitter"], Value::Null);
        assert_eq!(members[2].stats[0]["daily_checkin"], json!(0));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let roster = sample();
        let out = serde_json::to_value(&roster).unwrap();
        assert_eq!(out[0]["team_id"], json!(1));
        assert_eq!(out[0]["sub_teams"][0]["name"], json!("north"));
        assert_eq!(out[0]["sub_teams"][0]["members"][0]["discord"], json!("a#1"));
    }

    #[test]
    fn null_stats_load_as_an_empty_list() {
        let mut roster = Roster::from_json(
            &json!([{ "sub_teams": [{ "members": [
                { "name": "Dana", "twitter": "dana", "stats": null }
            ] }] }])
            .to_string(),
        )
        .unwrap();
        assert!(roster.members().next().unwrap().stats.is_empty());

        let now = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let counts: TweetCounts = [("dana".to_string(), 3)].into();
        roster.append_stats(&now, &counts, &CheckinStats::default());

        let stats = &roster.members().next().unwrap().stats;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0]["twitter"], json!(3));
    }

    #[test]
    fn malformed_roster_is_an_input_error() {
        let err = Roster::from_json("{\"not\": \"a list\"}").unwrap_err();
        assert!(matches!(err, TallyError::Input(_)));
    }
}
