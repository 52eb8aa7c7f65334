//! Action selection for the agent

use anyhow::Result;
use engine_core::{Action, StateId, ValueStore};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;

/// Epsilon-greedy selection over the actions the server offered.
///
/// Greedy choices break ties uniformly at random so an untrained table
/// does not always push the agent the same way.
#[derive(Debug)]
pub struct EpsilonGreedy {
    epsilon: f64,
    decay: f64,
    min_epsilon: f64,
    rng: ChaCha20Rng,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64, decay: f64, min_epsilon: f64, rng: ChaCha20Rng) -> Self {
        Self {
            epsilon,
            decay,
            min_epsilon,
            rng,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Pick an action for `state` from `available`, or `None` if there is
    /// nothing to pick from.
    pub fn select(
        &mut self,
        values: &ValueStore,
        state: StateId,
        available: &[Action],
    ) -> Result<Option<Action>> {
        if available.is_empty() {
            return Ok(None);
        }
        if self.rng.gen::<f64>() < self.epsilon {
            return Ok(available.choose(&mut self.rng).copied());
        }

        let row = values.q_row(state)?;
        let best = available
            .iter()
            .map(|a| row[a.index()])
            .fold(f64::NEG_INFINITY, f64::max);
        let ties: Vec<Action> = available
            .iter()
            .copied()
            .filter(|a| row[a.index()] == best)
            .collect();
        Ok(ties.choose(&mut self.rng).copied())
    }

    /// Shrink epsilon after an episode, never below the floor.
    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.decay).max(self.min_epsilon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(epsilon: f64) -> EpsilonGreedy {
        EpsilonGreedy::new(epsilon, 0.5, 0.1, ChaCha20Rng::seed_from_u64(42))
    }

    #[test]
    fn greedy_picks_highest_available() {
        let values = ValueStore::new(4);
        values.set_q(0, Action::Up, 9.0).unwrap();
        values.set_q(0, Action::Down, 1.0).unwrap();
        values.set_q(0, Action::Right, 2.0).unwrap();

        let mut policy = policy(0.0);
        for _ in 0..20 {
            let action = policy
                .select(&values, 0, &[Action::Down, Action::Right])
                .unwrap();
            assert_eq!(action, Some(Action::Right));
        }
    }

    #[test]
    fn greedy_ties_are_broken_randomly() {
        let values = ValueStore::new(4);
        let mut policy = policy(0.0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(
                policy
                    .select(&values, 0, &[Action::Down, Action::Right])
                    .unwrap(),
            );
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn exploration_stays_within_available() {
        let values = ValueStore::new(4);
        let mut policy = policy(1.0);
        for _ in 0..100 {
            let action = policy.select(&values, 0, &[Action::Left]).unwrap();
            assert_eq!(action, Some(Action::Left));
        }
    }

    #[test]
    fn empty_available_set_yields_none() {
        let values = ValueStore::new(4);
        assert_eq!(policy(0.5).select(&values, 0, &[]).unwrap(), None);
    }

    #[test]
    fn out_of_range_state_is_an_error() {
        let values = ValueStore::new(4);
        assert!(policy(0.0).select(&values, 9, &[Action::Up]).is_err());
    }

    #[test]
    fn decay_respects_floor() {
        let mut policy = policy(1.0);
        policy.decay();
        assert_eq!(policy.epsilon(), 0.5);
        for _ in 0..10 {
            policy.decay();
        }
        assert_eq!(policy.epsilon(), 0.1);
    }
}
