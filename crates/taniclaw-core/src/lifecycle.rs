//! Plant lifecycle state machine.
//!
//! Transitions are a static adjacency table. Timing comes from the knowledge
//! provider: a plant moves on once it has spent the stage's maximum
//! duration in its current state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::knowledge::KnowledgeProvider;
use crate::memory::Plant;
use crate::types::PlantState;

/// Plant types that go straight from vegetative growth to harvest.
pub const FLOWERING_SKIPPERS: &[&str] = &["spinach", "lettuce", "hydroponic"];

/// Allowed next states, in preference order. `Dead` is absorbing.
pub fn allowed_transitions(state: PlantState) -> &'static [PlantState] {
    use PlantState::*;
    match state {
        Seed => &[Germination, Dead],
        Germination => &[Vegetative, Dead],
        Vegetative => &[Flowering, Harvest, Dead],
        Flowering => &[Harvest, Vegetative, Dead],
        Harvest => &[Dormant, Dead],
        Dormant => &[Vegetative],
        Dead => &[],
    }
}

pub fn skips_flowering(plant_type: &str) -> bool {
    FLOWERING_SKIPPERS.contains(&plant_type)
}

pub struct StateEngine {
    knowledge: Arc<dyn KnowledgeProvider>,
}

impl StateEngine {
    pub fn new(knowledge: Arc<dyn KnowledgeProvider>) -> Self {
        Self { knowledge }
    }

    /// The plant's stored state. Unknown strings read as `Seed`.
    pub fn current_state(&self, plant: &Plant) -> PlantState {
        match plant.current_state.parse() {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(
                    plant_id = %plant.id,
                    state = %plant.current_state,
                    "unknown stored plant state, treating as seed"
                );
                PlantState::Seed
            }
        }
    }

    pub fn days_since_planting(&self, plant: &Plant, now: DateTime<Utc>) -> i64 {
        (now.date_naive() - plant.plant_date).num_days().max(0)
    }

    /// Whole days in the current state. A plant that never recorded a state
    /// change counts from its planting date.
    pub fn days_in_state(&self, plant: &Plant, now: DateTime<Utc>) -> i64 {
        match plant.state_changed_at {
            Some(changed) => (now - changed).num_days().max(0),
            None => self.days_since_planting(plant, now),
        }
    }

    pub fn can_transition(&self, from: PlantState, to: PlantState) -> bool {
        allowed_transitions(from).contains(&to)
    }

    /// The state the plant is due to move to, if its time in the current
    /// state has reached the stage's maximum duration.
    pub fn should_transition(&self, plant: &Plant, now: DateTime<Utc>) -> Option<PlantState> {
        let current = self.current_state(plant);
        if current == PlantState::Dead {
            return None;
        }

        let (_, max_days) = self
            .knowledge
            .stage_duration_bounds(&plant.plant_type, current);
        let days = self.days_in_state(plant, now);
        if days < i64::from(max_days) {
            return None;
        }

        let next = first_living_edge(current, &plant.plant_type);
        if let Some(next) = next {
            tracing::debug!(
                plant_id = %plant.id,
                from = %current,
                to = %next,
                days_in_state = days,
                max_days,
                "transition due"
            );
        }
        next
    }

    /// Preview of the next lifecycle stage, ignoring timing.
    pub fn next_state(&self, plant: &Plant) -> Option<PlantState> {
        first_living_edge(self.current_state(plant), &plant.plant_type)
    }
}

fn first_living_edge(current: PlantState, plant_type: &str) -> Option<PlantState> {
    let edges = allowed_transitions(current);
    let mut candidates: Vec<PlantState> = edges.to_vec();
    if skips_flowering(plant_type) {
        candidates.retain(|s| *s != PlantState::Flowering);
        if candidates.is_empty() {
            candidates = edges.to_vec();
        }
    }
    candidates.into_iter().find(|s| *s != PlantState::Dead)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KnowledgeBase, PlantKnowledge};
    use crate::memory::NewPlant;
    use chrono::{Duration, NaiveDate};

    const DOC: &str = r#"
plant_type: chili
lifecycle:
  stages:
    - name: vegetative
      duration_days: [10, 15]
"#;

    fn engine() -> StateEngine {
        let chili: PlantKnowledge = serde_yaml::from_str(DOC).unwrap();
        let mut spinach = chili.clone();
        spinach.plant_type = "spinach".to_string();
        StateEngine::new(Arc::new(KnowledgeBase::new([chili, spinach])))
    }

    fn plant(plant_type: &str, state: PlantState, days_in_state: i64, now: DateTime<Utc>) -> Plant {
        let mut p = Plant::new(NewPlant {
            name: "p".to_string(),
            plant_type: plant_type.to_string(),
            location: "yard".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            plant_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            growing_method: None,
            soil_condition: None,
            notes: None,
            initial_state: state,
        });
        p.state_changed_at = Some(now - Duration::days(days_in_state));
        p
    }

    #[test]
    fn dead_is_absorbing() {
        assert!(allowed_transitions(PlantState::Dead).is_empty());
        let e = engine();
        let now = Utc::now();
        assert_eq!(e.should_transition(&plant("chili", PlantState::Dead, 500, now), now), None);
        assert_eq!(e.next_state(&plant("chili", PlantState::Dead, 0, now)), None);
    }

    #[test]
    fn dormant_only_returns_to_vegetative() {
        assert_eq!(allowed_transitions(PlantState::Dormant), &[PlantState::Vegetative]);
        let e = engine();
        assert!(e.can_transition(PlantState::Dormant, PlantState::Vegetative));
        assert!(!e.can_transition(PlantState::Dormant, PlantState::Dead));
    }

    #[test]
    fn vegetative_past_max_moves_to_flowering() {
        let e = engine();
        let now = Utc::now();
        let p = plant("chili", PlantState::Vegetative, 20, now);
        assert_eq!(e.should_transition(&p, now), Some(PlantState::Flowering));
    }

    #[test]
    fn flowering_skippers_go_straight_to_harvest() {
        let e = engine();
        let now = Utc::now();
        let p = plant("spinach", PlantState::Vegetative, 20, now);
        assert_eq!(e.should_transition(&p, now), Some(PlantState::Harvest));
        for state in PlantState::all() {
            let p = plant("lettuce", *state, 1000, now);
            assert_ne!(e.should_transition(&p, now), Some(PlantState::Flowering));
        }
    }

    #[test]
    fn no_transition_before_max_duration() {
        let e = engine();
        let now = Utc::now();
        assert_eq!(
            e.should_transition(&plant("chili", PlantState::Vegetative, 14, now), now),
            None
        );
        // unknown type falls back to (7, 14)
        assert_eq!(
            e.should_transition(&plant("durian", PlantState::Seed, 13, now), now),
            None
        );
        assert_eq!(
            e.should_transition(&plant("durian", PlantState::Seed, 14, now), now),
            Some(PlantState::Germination)
        );
    }

    #[test]
    fn no_state_moves_a_day_before_its_max() {
        let e = engine();
        let now = Utc::now();
        // documented, flowering-skipping and undocumented plant types
        for plant_type in ["chili", "spinach", "durian"] {
            for state in PlantState::all() {
                let (_, max_days) = e.knowledge.stage_duration_bounds(plant_type, *state);
                let p = plant(plant_type, *state, i64::from(max_days) - 1, now);
                assert_eq!(
                    e.should_transition(&p, now),
                    None,
                    "{plant_type}/{state} moved after {} of {max_days} days",
                    max_days - 1
                );
            }
        }
    }

    #[test]
    fn missing_change_time_counts_from_planting() {
        let e = engine();
        let now = Utc::now();
        let mut p = plant("chili", PlantState::Vegetative, 0, now);
        p.state_changed_at = None;
        p.plant_date = now.date_naive() - Duration::days(16);
        assert_eq!(e.days_in_state(&p, now), 16);
        assert_eq!(e.should_transition(&p, now), Some(PlantState::Flowering));
    }

    #[test]
    fn future_change_time_floors_at_zero() {
        let e = engine();
        let now = Utc::now();
        let p = plant("chili", PlantState::Vegetative, -3, now);
        assert_eq!(e.days_in_state(&p, now), 0);
    }

    #[test]
    fn unknown_stored_state_reads_as_seed() {
        let e = engine();
        let now = Utc::now();
        let mut p = plant("chili", PlantState::Seed, 0, now);
        p.current_state = "sprouting".to_string();
        assert_eq!(e.current_state(&p), PlantState::Seed);
        assert_eq!(e.next_state(&p), Some(PlantState::Germination));
    }
}
