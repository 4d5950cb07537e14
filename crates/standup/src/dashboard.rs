//! Dashboard filtering and statistics over the flattened update rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::models::{Status, UpdateRow};
use crate::store::{Store, UpdateQuery};
use crate::StandupError;

pub const MANAGER_DEFAULT_DAYS: i64 = 7;
pub const USER_DEFAULT_DAYS: i64 = 30;
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    All,
    Recent,
    Blockers,
}

impl std::str::FromStr for Tab {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all"      => Ok(Self::All),
            "recent"   => Ok(Self::Recent),
            "blockers" => Ok(Self::Blockers),
            other      => Err(format!("unknown tab: {other}")),
        }
    }
}

/// Inclusive range of UTC calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `days` back from `today`, through `today`.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        Self { start: today - Duration::days(days), end: today }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardFilter {
    pub range: DateRange,
    pub team_id: Option<Uuid>,
    pub tab: Tab,
}

impl DashboardFilter {
    pub fn manager_default(today: NaiveDate) -> Self {
        Self {
            range: DateRange::last_days(today, MANAGER_DEFAULT_DAYS),
            team_id: None,
            tab: Tab::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_updates: usize,
    pub total_blockers: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub stuck_tasks: usize,
}

impl Stats {
    pub fn compute(rows: &[UpdateRow]) -> Self {
        let with_status = |status: Status| rows.iter().filter(|r| r.status == status).count();
        Self {
            total_updates: rows.len(),
            total_blockers: rows.iter().filter(|r| r.blocker_type.is_some()).count(),
            completed_tasks: with_status(Status::Completed),
            in_progress_tasks: with_status(Status::InProgress),
            stuck_tasks: with_status(Status::Blocked),
        }
    }
}

/// Apply date range, team and tab, in that order. `now` anchors the
/// `recent` tab.
pub fn filter_rows(rows: &[UpdateRow], filter: &DashboardFilter, now: DateTime<Utc>) -> Vec<UpdateRow> {
    let recent_cutoff = now - Duration::days(RECENT_DAYS);
    rows.iter()
        .filter(|r| filter.range.contains(r.created_at))
        .filter(|r| filter.team_id.map_or(true, |team| r.team_id == team))
        .filter(|r| match filter.tab {
            Tab::All => true,
            Tab::Recent => r.created_at >= recent_cutoff,
            Tab::Blockers => r.blocker_type.is_some(),
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardView {
    pub rows: Vec<UpdateRow>,
    pub stats: Stats,
}

impl DashboardView {
    pub fn from_rows(rows: Vec<UpdateRow>) -> Self {
        let stats = Stats::compute(&rows);
        Self { rows, stats }
    }
}

pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Manager dashboard: the team restriction is pushed into the query,
    /// everything else is filtered in memory.
    #[instrument(skip(self))]
    pub async fn dashboard(
        &self,
        filter: &DashboardFilter,
        now: DateTime<Utc>,
    ) -> Result<DashboardView, StandupError> {
        let query = UpdateQuery { team_id: filter.team_id, ..UpdateQuery::default() };
        let rows = self.store.list_update_rows(&query).await?;
        Ok(DashboardView::from_rows(filter_rows(&rows, filter, now)))
    }

    /// A user's own history.
    #[instrument(skip(self))]
    pub async fn my_updates(
        &self,
        email: &str,
        range: DateRange,
    ) -> Result<DashboardView, StandupError> {
        let query = UpdateQuery { employee_email: Some(email.to_owned()), ..UpdateQuery::default() };
        let rows = self.store.list_update_rows(&query).await?;
        let rows = rows.into_iter().filter(|r| range.contains(r.created_at)).collect();
        Ok(DashboardView::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::BlockerType;

    fn row(day: u32, team: Uuid, status: Status, blocker: Option<BlockerType>) -> UpdateRow {
        let id = Uuid::new_v4();
        UpdateRow {
            id,
            update_id: id,
            employee_name: "Asha".into(),
            employee_id: "E-1".into(),
            employee_email: "asha@example.com".into(),
            team_id: team,
            team_name: Some("Platform".into()),
            tasks_completed: "work".into(),
            status,
            blocker_type: blocker,
            blocker_description: blocker.map(|_| "something".into()),
            expected_resolution_date: None,
            additional_notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn sample(team_a: Uuid, team_b: Uuid) -> Vec<UpdateRow> {
        vec![
            row(2, team_a, Status::Completed, None),
            row(5, team_a, Status::Blocked, Some(BlockerType::Blockers)),
            row(5, team_a, Status::Blocked, Some(BlockerType::Risks)),
            row(9, team_b, Status::InProgress, None),
            row(14, team_b, Status::Completed, Some(BlockerType::Dependencies)),
            row(20, team_a, Status::InProgress, None),
        ]
    }

    #[test]
    fn date_range_is_inclusive_on_calendar_days() {
        let range = DateRange { start: date(5), end: date(9) };
        assert!(range.contains(Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()));
    }

    #[test]
    fn stats_after_range_change_match_isolated_filtering() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = sample(a, b);
        let now = Utc.with_ymd_and_hms(2025, 1, 21, 0, 0, 0).unwrap();

        let mut filter = DashboardFilter {
            range: DateRange { start: date(1), end: date(31) },
            team_id: None,
            tab: Tab::All,
        };
        let wide = Stats::compute(&filter_rows(&rows, &filter, now));
        assert_eq!(wide.total_updates, 6);

        filter.range = DateRange { start: date(4), end: date(10) };
        let narrowed = Stats::compute(&filter_rows(&rows, &filter, now));

        let isolated: Vec<UpdateRow> = rows
            .iter()
            .filter(|r| {
                let day = r.created_at.date_naive();
                day >= date(4) && day <= date(10)
            })
            .cloned()
            .collect();
        assert_eq!(narrowed, Stats::compute(&isolated));
        assert_eq!(
            narrowed,
            Stats { total_updates: 3, total_blockers: 2, completed_tasks: 0, in_progress_tasks: 1, stuck_tasks: 2 }
        );
    }

    #[test]
    fn team_and_tab_filters() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = sample(a, b);
        let now = Utc.with_ymd_and_hms(2025, 1, 21, 0, 0, 0).unwrap();
        let range = DateRange { start: date(1), end: date(31) };

        let team_b = DashboardFilter { range, team_id: Some(b), tab: Tab::All };
        assert_eq!(filter_rows(&rows, &team_b, now).len(), 2);

        let blockers = DashboardFilter { range, team_id: None, tab: Tab::Blockers };
        assert_eq!(filter_rows(&rows, &blockers, now).len(), 3);

        let recent = DashboardFilter { range, team_id: None, tab: Tab::Recent };
        let recent_rows = filter_rows(&rows, &recent, now);
        assert_eq!(recent_rows.len(), 2);
        assert!(recent_rows.iter().all(|r| r.created_at.date_naive() >= date(14)));
    }

    #[test]
    fn default_ranges() {
        let today = date(31);
        assert_eq!(DashboardFilter::manager_default(today).range.start, date(24));
        assert_eq!(DateRange::last_days(today, USER_DEFAULT_DAYS).start, date(1));
    }
}
