use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::models::{AssessmentLog, RiskAssessment, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Stable,
    Falling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Score change per snapshot interval.
    pub slope: f64,
    pub direction: TrendDirection,
    pub average: Option<f64>,
    pub points_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub month: u32,
    pub raw_score: f64,
    pub score: u8,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProjection {
    pub current_score: Option<u8>,
    pub insufficient_history: bool,
    pub trend: TrendAnalysis,
    pub points: Vec<ProjectedPoint>,
    /// First projected month in the High band or above.
    pub high_risk_month: Option<u32>,
    pub warning: Option<String>,
}

/// Naive endpoint slope over chronologically ordered scores. Fewer than two
/// points give a flat trend.
pub fn trend(scores: &[f64], stable_band: f64) -> TrendAnalysis {
    let n = scores.len();
    let slope = match (scores.first(), scores.last()) {
        (Some(first), Some(last)) if n >= 2 => (last - first) / (n - 1) as f64,
        _ => 0.0,
    };
    let direction = if slope > stable_band {
        TrendDirection::Rising
    } else if slope < -stable_band {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };

    TrendAnalysis {
        slope,
        direction,
        average: (n > 0).then(|| scores.iter().sum::<f64>() / n as f64),
        points_used: n,
    }
}

/// Projects a student's risk `horizon_months` ahead from the most recent
/// assessments in `history` (any order). Month `m` adds the trend slope plus
/// a duration term of `decay_per_month * m`.
pub fn project(
    history: &[RiskAssessment],
    horizon_months: u32,
    config: &EngineConfig,
) -> RiskProjection {
    let settings = &config.propagation;
    let log: AssessmentLog = history.iter().cloned().collect();
    let window = log.recent(settings.history_window);
    let scores: Vec<f64> = window.iter().map(|a| f64::from(a.score)).collect();

    let trend = trend(&scores, settings.trend_band);
    let current_score = log.latest().map(|a| a.score);
    let mut running = current_score.map_or(0.0, f64::from);

    let points: Vec<ProjectedPoint> = (1..=horizon_months)
        .map(|month| {
            running += trend.slope + settings.decay_per_month * f64::from(month);
            running = running.clamp(0.0, 100.0);
            let score = crate::risk::clamp_score(running);
            ProjectedPoint {
                month,
                raw_score: running,
                score,
                severity: config.severity.classify(score),
            }
        })
        .collect();

    let high_threshold = config.severity.high_threshold();
    let high_risk_month = points
        .iter()
        .find(|point| point.score >= high_threshold)
        .map(|point| point.month);

    let warning = points.last().and_then(|last| match last.severity {
        Severity::Critical => Some(format!(
            "projected to reach critical risk ({}) within {} months; \
             immediate intervention advised",
            last.score, last.month
        )),
        Severity::High => Some(format!(
            "projected to reach high risk ({}) within {} months; monitor closely",
            last.score, last.month
        )),
        _ => None,
    });

    RiskProjection {
        current_score,
        insufficient_history: scores.len() < 2,
        trend,
        points,
        high_risk_month,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PropagationConfig, SeverityBands};
    use crate::models::HazardType;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn history(scores: &[u8]) -> Vec<RiskAssessment> {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let student_id = Uuid::new_v4();
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| RiskAssessment {
                id: Uuid::new_v4(),
                student_id,
                score: *score,
                severity: Severity::Low,
                hazard: HazardType::General,
                ghost: false,
                assessed_at: start + Duration::days(30 * i as i64),
            })
            .collect()
    }

    fn without_decay() -> EngineConfig {
        EngineConfig {
            propagation: PropagationConfig {
                decay_per_month: 0.0,
                ..PropagationConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn slope_uses_endpoints() {
        let analysis = trend(&[10.0, 30.0, 20.0, 40.0], 1.0);
        assert!((analysis.slope - 10.0).abs() < 1e-12);
        assert_eq!(analysis.direction, TrendDirection::Rising);
        assert_eq!(analysis.average, Some(25.0));

        let flat = trend(&[42.0], 1.0);
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.direction, TrendDirection::Stable);
        assert_eq!(trend(&[], 1.0).average, None);
    }

    #[test]
    fn duration_term_grows_each_month() {
        let config = EngineConfig::default();
        let projection = project(&history(&[20, 20]), 3, &config);

        let raw: Vec<f64> = projection.points.iter().map(|p| p.raw_score).collect();
        assert_eq!(raw, vec![20.5, 21.5, 23.0]);
        assert_eq!(projection.points[2].score, 23);
        assert!(!projection.insufficient_history);
    }

    #[test]
    fn only_the_recent_window_drives_the_trend() {
        let config = without_decay();
        // the early spike falls outside the six-point window
        let projection = project(&history(&[90, 10, 20, 30, 40, 50, 60]), 1, &config);
        assert!((projection.trend.slope - 10.0).abs() < 1e-12);
        assert_eq!(projection.trend.points_used, 6);
        assert_eq!(projection.points[0].score, 70);
    }

    #[test]
    fn out_of_order_history_is_sorted_by_timestamp() {
        let config = without_decay();
        let mut records = history(&[30, 40, 50]);
        records.reverse();
        let projection = project(&records, 1, &config);
        assert_eq!(projection.current_score, Some(50));
        assert_eq!(projection.points[0].score, 60);
    }

    #[test]
    fn early_warning_marks_first_high_month() {
        let config = EngineConfig::default();
        let projection = project(&history(&[30, 35, 40, 45]), 12, &config);

        // 45 + 5.5 = 50.5 rounds to 51 in the first month
        assert_eq!(projection.high_risk_month, Some(1));
        assert_eq!(projection.points.last().map(|p| p.score), Some(100));
        assert!(projection
            .warning
            .as_deref()
            .is_some_and(|w| w.contains("critical")));
    }

    #[test]
    fn high_risk_month_follows_configured_bands() {
        let mut config = without_decay();
        assert_eq!(project(&history(&[50, 55]), 3, &config).high_risk_month, Some(1));

        config.severity = SeverityBands {
            low_max: 30,
            medium_max: 62,
            high_max: 80,
        };
        let projection = project(&history(&[50, 55]), 3, &config);
        let scores: Vec<u8> = projection.points.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![60, 65, 70]);
        assert_eq!(projection.high_risk_month, Some(2));
    }

    #[test]
    fn empty_history_is_insufficient_but_still_projects_decay() {
        let config = EngineConfig::default();
        let projection = project(&[], 2, &config);

        assert!(projection.insufficient_history);
        assert_eq!(projection.current_score, None);
        assert_eq!(projection.trend.slope, 0.0);
        assert_eq!(projection.points[1].raw_score, 1.5);
        assert_eq!(projection.high_risk_month, None);
        assert_eq!(projection.warning, None);
    }

    #[test]
    fn falling_trend_is_floored_at_zero() {
        let config = without_decay();
        let projection = project(&history(&[60, 30]), 4, &config);
        assert_eq!(projection.trend.direction, TrendDirection::Falling);
        let scores: Vec<u8> = projection.points.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![0, 0, 0, 0]);
    }

    proptest! {
        #[test]
        fn projected_change_follows_trend_sign(
            scores in proptest::collection::vec(1u8..100, 1..7),
        ) {
            let config = without_decay();
            let records = history(&scores);
            let projection = project(&records, 1, &config);
            let start = f64::from(*scores.last().unwrap());
            let change = projection.points[0].raw_score - start;
            let slope = projection.trend.slope;

            prop_assert_eq!(change > 0.0, slope > 0.0);
            prop_assert_eq!(change < 0.0, slope < 0.0);
        }
    }
}
