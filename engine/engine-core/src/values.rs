//! Q- and V-tables for one learner.
//!
//! Both tables are fully populated for every state at construction and are
//! backed by sharded concurrent maps, so updates to different states never
//! contend and updates to the same state are serialized per entry.

use crate::action::Action;
use crate::error::EngineError;
use crate::grid::StateId;
use dashmap::DashMap;
use rand::Rng;

/// One Q-table row, indexed by [`Action::index`].
pub type QRow = [f64; Action::COUNT];

#[derive(Debug)]
pub struct ValueStore {
    num_states: usize,
    q: DashMap<StateId, QRow>,
    v: DashMap<StateId, f64>,
}

fn ensure_finite(value: f64) -> Result<f64, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFiniteValue(value))
    }
}

impl ValueStore {
    /// All-zero tables for `num_states` states.
    pub fn new(num_states: usize) -> Self {
        Self {
            num_states,
            q: (0..num_states).map(|s| (s, [0.0; Action::COUNT])).collect(),
            v: (0..num_states).map(|s| (s, 0.0)).collect(),
        }
    }

    /// Q-values drawn uniformly from `[0, 1)`, V-values zero.
    pub fn with_random_q<R: Rng>(num_states: usize, rng: &mut R) -> Self {
        let store = Self::new(num_states);
        for mut row in store.q.iter_mut() {
            for value in row.value_mut().iter_mut() {
                *value = rng.gen::<f64>();
            }
        }
        store
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    fn ensure_state(&self, state: StateId) -> Result<(), EngineError> {
        if state < self.num_states {
            Ok(())
        } else {
            Err(EngineError::StateOutOfRange {
                state: state as i64,
                num_states: self.num_states,
            })
        }
    }

    fn row(&self, state: StateId) -> Result<QRow, EngineError> {
        self.ensure_state(state)?;
        self.q
            .get(&state)
            .map(|row| *row)
            .ok_or(EngineError::StateOutOfRange {
                state: state as i64,
                num_states: self.num_states,
            })
    }

    pub fn get_q(&self, state: StateId, action: Action) -> Result<f64, EngineError> {
        Ok(self.row(state)?[action.index()])
    }

    /// Copy of all four action values for `state`.
    pub fn q_row(&self, state: StateId) -> Result<QRow, EngineError> {
        self.row(state)
    }

    /// Largest stored action value for `state`, over all four slots.
    pub fn max_q(&self, state: StateId) -> Result<f64, EngineError> {
        Ok(self
            .row(state)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    pub fn set_q(&self, state: StateId, action: Action, value: f64) -> Result<(), EngineError> {
        self.ensure_state(state)?;
        let value = ensure_finite(value)?;
        if let Some(mut row) = self.q.get_mut(&state) {
            row[action.index()] = value;
        }
        Ok(())
    }

    /// Like [`set_q`](Self::set_q) but with a raw action index, rejecting
    /// anything outside `0..4`.
    pub fn set_q_index(&self, state: StateId, index: i64, value: f64) -> Result<(), EngineError> {
        self.set_q(state, Action::from_code(index)?, value)
    }

    pub fn get_v(&self, state: StateId) -> Result<f64, EngineError> {
        self.ensure_state(state)?;
        self.v
            .get(&state)
            .map(|v| *v)
            .ok_or(EngineError::StateOutOfRange {
                state: state as i64,
                num_states: self.num_states,
            })
    }

    pub fn set_v(&self, state: StateId, value: f64) -> Result<(), EngineError> {
        self.ensure_state(state)?;
        let value = ensure_finite(value)?;
        if let Some(mut entry) = self.v.get_mut(&state) {
            *entry = value;
        }
        Ok(())
    }

    /// One-step Q-learning:
    /// `Q(s,a) += alpha * (reward + gamma * max_a' Q(s',a') - Q(s,a))`.
    ///
    /// The max runs over all four stored slots of `next_state`, including
    /// moves that are unavailable there. A non-finite result is rejected
    /// and leaves the table untouched.
    pub fn apply_q_update(
        &self,
        state: StateId,
        action: Action,
        reward: f64,
        next_state: StateId,
        alpha: f64,
        gamma: f64,
    ) -> Result<(), EngineError> {
        self.ensure_state(state)?;
        let max_next = self.max_q(next_state)?;
        if let Some(mut row) = self.q.get_mut(&state) {
            let current = row[action.index()];
            let updated = ensure_finite(current + alpha * (reward + gamma * max_next - current))?;
            row[action.index()] = updated;
        }
        Ok(())
    }

    /// TD(0) state-value update: `V(s) += alpha * (reward + gamma * V(s') - V(s))`.
    pub fn apply_v_update(
        &self,
        state: StateId,
        reward: f64,
        next_state: StateId,
        alpha: f64,
        gamma: f64,
    ) -> Result<(), EngineError> {
        self.ensure_state(state)?;
        let next_value = self.get_v(next_state)?;
        if let Some(mut entry) = self.v.get_mut(&state) {
            let current = *entry;
            *entry = ensure_finite(current + alpha * (reward + gamma * next_value - current))?;
        }
        Ok(())
    }

    /// Highest-valued action among `candidates`, first one wins ties.
    pub fn best_action(
        &self,
        state: StateId,
        candidates: &[Action],
    ) -> Result<Option<Action>, EngineError> {
        let row = self.row(state)?;
        let mut best: Option<Action> = None;
        for &action in candidates {
            match best {
                Some(current) if row[current.index()] >= row[action.index()] => {}
                _ => best = Some(action),
            }
        }
        Ok(best)
    }

    /// Row-ordered copy of the Q-table.
    pub fn q_snapshot(&self) -> Vec<QRow> {
        (0..self.num_states)
            .map(|s| self.q.get(&s).map(|row| *row).unwrap_or_default())
            .collect()
    }

    /// Row-ordered copy of the V-table.
    pub fn v_snapshot(&self) -> Vec<f64> {
        (0..self.num_states)
            .map(|s| self.v.get(&s).map(|v| *v).unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::sync::Arc;
    use std::thread;

    const TOL: f64 = 1e-6;

    #[test]
    fn tables_are_fully_populated() {
        let store = ValueStore::new(25);
        assert_eq!(store.q_snapshot().len(), 25);
        assert_eq!(store.v_snapshot().len(), 25);
        for s in 0..25 {
            assert_eq!(store.q_row(s).unwrap(), [0.0; 4]);
            assert_eq!(store.get_v(s).unwrap(), 0.0);
        }
    }

    #[test]
    fn random_q_init_stays_in_unit_interval() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let store = ValueStore::with_random_q(16, &mut rng);
        for row in store.q_snapshot() {
            for value in row {
                assert!((0.0..1.0).contains(&value));
            }
        }
        assert!(store.v_snapshot().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn set_and_get_round_trip_per_slot() {
        let store = ValueStore::new(4);
        store.set_q(2, Action::Left, 1.5).unwrap();
        store.set_v(3, -2.0).unwrap();
        assert_eq!(store.get_q(2, Action::Left).unwrap(), 1.5);
        assert_eq!(store.get_q(2, Action::Right).unwrap(), 0.0);
        assert_eq!(store.get_v(3).unwrap(), -2.0);
    }

    #[test]
    fn out_of_range_writes_are_errors() {
        let store = ValueStore::new(4);
        assert_eq!(
            store.set_q_index(0, 4, 1.0),
            Err(EngineError::InvalidAction(4))
        );
        assert!(matches!(
            store.set_q(4, Action::Up, 1.0),
            Err(EngineError::StateOutOfRange { state: 4, .. })
        ));
        assert!(store.set_v(10, 1.0).is_err());
        assert!(store.get_q(4, Action::Up).is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let store = ValueStore::new(4);
        assert!(store.set_q(0, Action::Up, f64::NAN).is_err());
        assert!(store.set_v(0, f64::INFINITY).is_err());
        assert_eq!(store.get_q(0, Action::Up).unwrap(), 0.0);
    }

    #[test]
    fn q_update_matches_formula() {
        let store = ValueStore::new(4);
        let (q0, r, a, g) = (0.4, -0.01, 0.1, 0.9);
        store.set_q(0, Action::Right, q0).unwrap();
        store.set_q(1, Action::Down, 0.7).unwrap();
        store.set_q(1, Action::Left, 0.2).unwrap();

        store.apply_q_update(0, Action::Right, r, 1, a, g).unwrap();

        let expected = q0 + a * (r + g * 0.7 - q0);
        assert!((store.get_q(0, Action::Right).unwrap() - expected).abs() < TOL);
    }

    #[test]
    fn q_update_max_includes_unavailable_slots() {
        // State 0 of a 2x2 grid cannot move UP, but its UP slot still
        // feeds the bootstrap target.
        let store = ValueStore::new(4);
        store.set_q(0, Action::Up, 5.0).unwrap();
        store.set_q(0, Action::Right, 1.0).unwrap();

        store.apply_q_update(1, Action::Left, 0.0, 0, 1.0, 1.0).unwrap();

        assert!((store.get_q(1, Action::Left).unwrap() - 5.0).abs() < TOL);
    }

    #[test]
    fn q_update_on_self_loop() {
        let store = ValueStore::new(4);
        store.set_q(0, Action::Up, 1.0).unwrap();
        store.apply_q_update(0, Action::Up, 1.0, 0, 0.5, 0.5).unwrap();
        // 1.0 + 0.5 * (1.0 + 0.5 * 1.0 - 1.0)
        assert!((store.get_q(0, Action::Up).unwrap() - 1.25).abs() < TOL);
    }

    #[test]
    fn v_update_matches_formula() {
        let store = ValueStore::new(4);
        store.set_v(0, 0.3).unwrap();
        store.set_v(1, 2.0).unwrap();
        store.apply_v_update(0, 1.0, 1, 0.1, 0.9).unwrap();
        let expected = 0.3 + 0.1 * (1.0 + 0.9 * 2.0 - 0.3);
        assert!((store.get_v(0).unwrap() - expected).abs() < TOL);
    }

    #[test]
    fn best_action_respects_candidates() {
        let store = ValueStore::new(4);
        store.set_q(0, Action::Up, 9.0).unwrap();
        store.set_q(0, Action::Down, 2.0).unwrap();
        store.set_q(0, Action::Right, 3.0).unwrap();
        let best = store
            .best_action(0, &[Action::Down, Action::Right])
            .unwrap();
        assert_eq!(best, Some(Action::Right));
        assert_eq!(store.best_action(0, &[]).unwrap(), None);
    }

    #[test]
    fn concurrent_updates_to_distinct_states() {
        let store = Arc::new(ValueStore::new(64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..8 {
                        let state = t * 8 + i;
                        for _ in 0..100 {
                            store.apply_v_update(state, 1.0, state, 0.5, 0.0).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for v in store.v_snapshot() {
            assert!((v - 1.0).abs() < TOL);
        }
    }
}
