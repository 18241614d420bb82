use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::graph::entity::Entity;

/// Which side of a conflict a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictResolution {
    pub winner: Side,
    pub loser: Side,
    pub reason: String,
    pub timestamp_diff_ms: i64,
}

/// The two attributes the conflict rule actually needs from a record.
/// `sync_id` disambiguates two updates with indistinguishable timestamps;
/// this implementation uses the version string as `sync_id` since it is
/// already a globally unique, lexicographically comparable identifier
/// stamped at creation time (see DESIGN.md for why no separate field is
/// introduced).
pub struct ConflictRecord<'a> {
    pub updated_at: DateTime<Utc>,
    pub sync_id: &'a str,
}

impl<'a> From<&'a Entity> for ConflictRecord<'a> {
    fn from(entity: &'a Entity) -> Self {
        ConflictRecord {
            updated_at: entity.updated_at,
            sync_id: entity.version.as_str(),
        }
    }
}

const TIEBREAK_THRESHOLD_MS: i64 = 1000;

/// Deterministic last-write-wins with a sync-id tiebreaker. Tombstones
/// (entities whose `content.deleted == true`) are ordinary records under
/// this rule; deletion carries no special precedence beyond its timestamp
/// and sync_id, per the fixed tombstone semantics.
///
/// `resolve(L, R) == resolve(R, L)` up to winner/loser swap: the function
/// is symmetric by construction, since it is expressed purely in terms of
/// `Δ = R.updated_at - L.updated_at` and a lexicographic comparison.
pub fn resolve_conflict(local: &ConflictRecord, remote: &ConflictRecord) -> ConflictResolution {
    let delta_ms = (remote.updated_at - local.updated_at).num_milliseconds();

    if delta_ms.abs() >= TIEBREAK_THRESHOLD_MS {
        if delta_ms > 0 {
            ConflictResolution {
                winner: Side::Remote,
                loser: Side::Local,
                reason: "remote has newer timestamp".to_string(),
                timestamp_diff_ms: delta_ms,
            }
        } else {
            ConflictResolution {
                winner: Side::Local,
                loser: Side::Remote,
                reason: "local has newer timestamp".to_string(),
                timestamp_diff_ms: delta_ms,
            }
        }
    } else if remote.sync_id > local.sync_id {
        ConflictResolution {
            winner: Side::Remote,
            loser: Side::Local,
            reason: "timestamps equal, remote has higher sync_id".to_string(),
            timestamp_diff_ms: delta_ms,
        }
    } else {
        ConflictResolution {
            winner: Side::Local,
            loser: Side::Remote,
            reason: "timestamps equal, local has higher sync_id".to_string(),
            timestamp_diff_ms: delta_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(ts: DateTime<Utc>, sync_id: &str) -> ConflictRecord {
        ConflictRecord { updated_at: ts, sync_id }
    }

    #[test]
    fn newer_remote_wins_with_exact_diff() {
        let local = record(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(), "aaa");
        let remote = record(Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap(), "bbb");
        let res = resolve_conflict(&local, &remote);
        assert_eq!(res.winner, Side::Remote);
        assert_eq!(res.reason, "remote has newer timestamp");
        assert_eq!(res.timestamp_diff_ms, 3_600_000);
    }

    #[test]
    fn newer_local_wins() {
        let local = record(Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap(), "aaa");
        let remote = record(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(), "bbb");
        let res = resolve_conflict(&local, &remote);
        assert_eq!(res.winner, Side::Local);
        assert_eq!(res.reason, "local has newer timestamp");
    }

    #[test]
    fn sync_id_tiebreak_within_threshold() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let local = record(t, "mmm");
        let remote = record(t, "zzz");
        let res = resolve_conflict(&local, &remote);
        assert_eq!(res.winner, Side::Remote);
        assert!(res.reason.contains("sync_id"));
    }

    #[test]
    fn sync_id_tiebreak_favors_local_when_greater() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let local = record(t, "zzz");
        let remote = record(t, "mmm");
        let res = resolve_conflict(&local, &remote);
        assert_eq!(res.winner, Side::Local);
    }

    #[test]
    fn resolution_is_symmetric_up_to_swap() {
        let local = record(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(), "aaa");
        let remote = record(Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap(), "bbb");
        let forward = resolve_conflict(&local, &remote);
        let backward = resolve_conflict(&remote, &local);
        assert_eq!(forward.winner, backward.loser);
        assert_eq!(forward.loser, backward.winner);
        assert_eq!(forward.timestamp_diff_ms, -backward.timestamp_diff_ms);
    }

    #[test]
    fn sub_threshold_diff_still_uses_tiebreak() {
        let local = record(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(), "aaa");
        let remote_ts = local.updated_at + chrono::Duration::milliseconds(999);
        let remote = record(remote_ts, "bbb");
        let res = resolve_conflict(&local, &remote);
        assert!(res.reason.contains("sync_id"));
    }
}
