use crate::models::{DailyPoint, StatsResponse, WellnessStats};
use crate::profile_store::{LocalProfileStore, SymptomLogs};
use crate::storage::KeyValueStore;
use chrono::{Duration, Local, NaiveDate};

pub fn build_stats<S: KeyValueStore>(store: &LocalProfileStore<S>) -> StatsResponse {
    build_stats_at(
        Local::now().date_naive(),
        &store.wellness_stats(),
        &store.symptom_logs(),
    )
}

pub fn build_stats_at(
    today: NaiveDate,
    stats: &WellnessStats,
    logs: &SymptomLogs,
) -> StatsResponse {
    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = date_key(today - Duration::days(offset));
        last_7_days.push(DailyPoint {
            water_glasses: stats.water_by_date.get(&date).copied().unwrap_or_default(),
            symptom_count: logs.get(&date).map(|log| log.symptoms.len()).unwrap_or_default(),
            date,
        });
    }

    let days_tracked = stats
        .days_tracked
        .filter(|days| *days > 0)
        .unwrap_or(logs.len() as u64);

    StatsResponse {
        days_tracked,
        workouts: stats.workouts,
        meditation_minutes: stats.meditation,
        water_today: stats
            .water_by_date
            .get(&date_key(today))
            .copied()
            .unwrap_or_default(),
        last_7_days,
    }
}

/// Local calendar day in the `YYYY-MM-DD` form every stored day key uses.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}
