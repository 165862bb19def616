use super::record::NewLocation;

pub const DEMO_OWNER: &str = "test_user";

const START_LAT: f64 = 48.18699396030242;
const START_LON: f64 = 16.356373567789245;
const STEP_DEG: f64 = 0.001;
const POINTS: i64 = 5;
const SPACING_MS: i64 = 10 * 60 * 1000;
const NEWEST_AGE_MS: i64 = 20 * 60 * 1000;

/// Short walk through Vienna, one point every ten minutes, the newest
/// twenty minutes before `now_ms`.
pub fn demo_records(now_ms: i64) -> Vec<NewLocation> {
    (0..POINTS)
        .map(|i| {
            let age = NEWEST_AGE_MS + (POINTS - 1 - i) * SPACING_MS;
            NewLocation::new(
                DEMO_OWNER,
                START_LAT + STEP_DEG * i as f64,
                START_LON + STEP_DEG * i as f64,
                (now_ms - age).max(0),
            )
        })
        .collect()
}
