//! Multi-year what-if projection of enrolled population against advisor
//! capacity under a fixed yearly intake.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{EngineConfig, SimulationConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{ProgramTrack, Recommendation};

const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub initial_population: u64,
    pub intake_per_year: u64,
    pub track_distribution: Option<BTreeMap<ProgramTrack, f64>>,
    pub graduation_rate: f64,
    pub horizon_years: u32,
    pub total_capacity: u64,
}

impl ScenarioParams {
    /// Scenario with the configured graduation rate and horizon.
    pub fn new(
        initial_population: u64,
        intake_per_year: u64,
        total_capacity: u64,
        config: &SimulationConfig,
    ) -> Self {
        Self {
            initial_population,
            intake_per_year,
            track_distribution: None,
            graduation_rate: config.graduation_rate,
            horizon_years: config.default_horizon_years,
            total_capacity,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.graduation_rate) {
            return Err(EngineError::invalid(
                "scenario.graduation_rate",
                format!("must lie in [0, 1], got {}", self.graduation_rate),
            ));
        }
        if self.horizon_years == 0 {
            return Err(EngineError::invalid(
                "scenario.horizon_years",
                "must simulate at least one year",
            ));
        }
        if let Some(distribution) = &self.track_distribution {
            if distribution.is_empty() {
                return Err(EngineError::invalid(
                    "scenario.track_distribution",
                    "distribution is empty",
                ));
            }
            if distribution.values().any(|share| !share.is_finite() || *share < 0.0) {
                return Err(EngineError::invalid(
                    "scenario.track_distribution",
                    "shares must be non-negative numbers",
                ));
            }
            let sum: f64 = distribution.values().sum();
            if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
                return Err(EngineError::invalid(
                    "scenario.track_distribution",
                    format!("shares must sum to 1.0, got {sum}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearProjection {
    pub year: u32,
    pub starting_population: u64,
    /// Population after intake, before graduations.
    pub population: u64,
    pub graduates: u64,
    pub ending_population: u64,
    pub net_growth: i64,
    pub intake_by_track: BTreeMap<ProgramTrack, u64>,
    pub capacity_sufficient: bool,
    pub shortfall: u64,
    pub surplus: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationScenario {
    pub id: Uuid,
    pub params: ScenarioParams,
    pub projection: Vec<YearProjection>,
    pub recommendations: Vec<Recommendation>,
}

impl SimulationScenario {
    pub fn final_year(&self) -> Option<&YearProjection> {
        self.projection.last()
    }

    /// JSON document a caller can store as an audit trail of the run.
    pub fn audit_record(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub fn simulate(params: ScenarioParams, config: &EngineConfig) -> EngineResult<SimulationScenario> {
    params.validate()?;

    let mut population = params.initial_population;
    let mut projection = Vec::with_capacity(params.horizon_years as usize);

    for year in 1..=params.horizon_years {
        let starting_population = population;
        population += params.intake_per_year;
        let peak = population;
        let graduates = (peak as f64 * params.graduation_rate).floor() as u64;
        population -= graduates.min(population);

        projection.push(YearProjection {
            year,
            starting_population,
            population: peak,
            graduates,
            ending_population: population,
            net_growth: params.intake_per_year as i64 - graduates as i64,
            intake_by_track: split_intake(
                params.intake_per_year,
                params.track_distribution.as_ref(),
            ),
            capacity_sufficient: peak <= params.total_capacity,
            shortfall: peak.saturating_sub(params.total_capacity),
            surplus: params.total_capacity.saturating_sub(peak),
        });
    }

    let recommendations = crate::recommend::for_projection(&projection, &config.simulation);

    Ok(SimulationScenario {
        id: Uuid::new_v4(),
        params,
        projection,
        recommendations,
    })
}

/// Largest-remainder split of `intake` across tracks. Shares are scaled by
/// their sum first, so the parts add up to `intake` exactly even when the
/// shares themselves are slightly off 1.0. With no usable share at all the
/// intake is split evenly.
pub fn split_intake(
    intake: u64,
    distribution: Option<&BTreeMap<ProgramTrack, f64>>,
) -> BTreeMap<ProgramTrack, u64> {
    let Some(distribution) = distribution.filter(|distribution| !distribution.is_empty()) else {
        return BTreeMap::new();
    };

    let usable = |share: f64| share.is_finite() && share > 0.0;
    let total: f64 = distribution.values().copied().filter(|share| usable(*share)).sum();
    let fraction = |share: f64| match (total > 0.0, usable(share)) {
        (true, true) => share / total,
        (true, false) => 0.0,
        (false, _) => 1.0 / distribution.len() as f64,
    };

    let mut parts: Vec<(ProgramTrack, u64, f64)> = distribution
        .iter()
        .map(|(track, share)| {
            let exact = intake as f64 * fraction(*share);
            let whole = exact.floor();
            (*track, whole as u64, exact - whole)
        })
        .collect();

    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|a, b| parts[*b].2.total_cmp(&parts[*a].2));

    let allotted: u64 = parts.iter().map(|(_, whole, _)| whole).sum();
    if allotted < intake {
        let mut leftover = intake - allotted;
        for &index in order.iter().cycle() {
            if leftover == 0 {
                break;
            }
            parts[index].1 += 1;
            leftover -= 1;
        }
    } else {
        // rounding can overshoot by a unit or two; take it back from the
        // smallest remainders
        let mut excess = allotted - intake;
        for &index in order.iter().rev().cycle() {
            if excess == 0 {
                break;
            }
            if parts[index].1 > 0 {
                parts[index].1 -= 1;
                excess -= 1;
            }
        }
    }

    parts.into_iter().map(|(track, count, _)| (track, count)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(initial: u64, intake: u64, horizon: u32, capacity: u64) -> ScenarioParams {
        ScenarioParams {
            horizon_years: horizon,
            ..ScenarioParams::new(initial, intake, capacity, &SimulationConfig::default())
        }
    }

    #[test]
    fn two_year_projection() {
        let config = EngineConfig::default();
        let scenario = simulate(params(500, 50, 2, 600), &config).unwrap();

        let first = &scenario.projection[0];
        assert_eq!((first.population, first.graduates, first.ending_population), (550, 82, 468));
        assert_eq!(first.net_growth, -32);
        assert!(first.capacity_sufficient);
        assert_eq!(first.surplus, 50);

        let second = &scenario.projection[1];
        assert_eq!(second.starting_population, 468);
        assert_eq!((second.population, second.graduates, second.ending_population), (518, 77, 441));
        assert!(scenario.recommendations.is_empty());
    }

    #[test]
    fn shortfall_is_flagged_and_recommended() {
        let config = EngineConfig::default();
        let scenario = simulate(params(500, 120, 3, 560), &config).unwrap();

        let first = &scenario.projection[0];
        assert!(!first.capacity_sufficient);
        assert_eq!(first.shortfall, 60);
        assert_eq!(first.surplus, 0);
        assert!(!scenario.recommendations.is_empty());
    }

    #[test]
    fn invalid_scenarios_are_rejected() {
        let config = EngineConfig::default();
        let mut bad_rate = params(10, 5, 2, 20);
        bad_rate.graduation_rate = 1.5;
        assert!(simulate(bad_rate, &config).unwrap_err().is_unit_scoped());

        assert!(simulate(params(10, 5, 0, 20), &config).is_err());

        let mut bad_split = params(10, 5, 2, 20);
        bad_split.track_distribution = Some(BTreeMap::from([
            (ProgramTrack::Doctoral, 0.5),
            (ProgramTrack::ThesisMasters, 0.2),
        ]));
        assert!(simulate(bad_split, &config).is_err());
    }

    #[test]
    fn intake_split_by_track_adds_up() {
        let distribution = BTreeMap::from([
            (ProgramTrack::Doctoral, 0.3),
            (ProgramTrack::ThesisMasters, 0.5),
            (ProgramTrack::NonThesisMasters, 0.2),
        ]);
        let split = split_intake(51, Some(&distribution));

        assert_eq!(split.values().sum::<u64>(), 51);
        assert_eq!(split[&ProgramTrack::ThesisMasters], 26);
        assert_eq!(split[&ProgramTrack::Doctoral], 15);
        assert_eq!(split[&ProgramTrack::NonThesisMasters], 10);
        assert!(split_intake(51, None).is_empty());
    }

    #[test]
    fn large_intake_split_is_exact_for_shares_within_tolerance() {
        for share in [0.5000004, 0.4999996] {
            let distribution = BTreeMap::from([
                (ProgramTrack::Doctoral, share),
                (ProgramTrack::ThesisMasters, share),
            ]);
            let mut scenario_params = params(0, 10_000_000, 1, 20_000_000);
            scenario_params.track_distribution = Some(distribution.clone());
            assert!(scenario_params.validate().is_ok());

            let split = split_intake(10_000_000, Some(&distribution));
            assert_eq!(split.values().sum::<u64>(), 10_000_000);
            assert_eq!(split[&ProgramTrack::Doctoral], 5_000_000);
            assert_eq!(split[&ProgramTrack::ThesisMasters], 5_000_000);
        }
    }

    #[test]
    fn all_zero_shares_split_evenly() {
        let distribution = BTreeMap::from([
            (ProgramTrack::Doctoral, 0.0),
            (ProgramTrack::ThesisMasters, 0.0),
        ]);
        let split = split_intake(7, Some(&distribution));
        assert_eq!(split.values().sum::<u64>(), 7);
        assert!(split.values().all(|count| (3..=4).contains(count)));
    }

    #[test]
    fn audit_record_serializes_projection() {
        let scenario = simulate(params(100, 10, 1, 200), &EngineConfig::default()).unwrap();
        let record = scenario.audit_record().unwrap();
        assert_eq!(record["projection"][0]["population"], 110);
        assert_eq!(record["params"]["graduation_rate"], 0.15);
    }

    proptest! {
        #[test]
        fn population_follows_recurrence(
            initial in 0u64..5_000,
            intake in 0u64..500,
            rate in 0.0f64..=1.0,
            horizon in 1u32..10,
        ) {
            let mut scenario_params = params(initial, intake, horizon, 1_000);
            scenario_params.graduation_rate = rate;
            let scenario = simulate(scenario_params, &EngineConfig::default()).unwrap();

            prop_assert_eq!(scenario.projection.len(), horizon as usize);
            let mut previous = initial;
            for year in &scenario.projection {
                prop_assert_eq!(year.starting_population, previous);
                prop_assert_eq!(year.ending_population + year.graduates, previous + intake);
                previous = year.ending_population;
            }
        }

        #[test]
        fn split_always_adds_up(
            intake in 0u64..50_000_000,
            doctoral in 0.0f64..1.0,
            drift in -1e-6f64..1e-6,
        ) {
            let distribution = BTreeMap::from([
                (ProgramTrack::Doctoral, doctoral),
                (ProgramTrack::ThesisMasters, 1.0 - doctoral + drift),
            ]);
            let split = split_intake(intake, Some(&distribution));
            prop_assert_eq!(split.values().sum::<u64>(), intake);
        }
    }
}
