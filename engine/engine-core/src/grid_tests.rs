//! Tests for GridEnvironment

use super::*;
use engine_config::WorldConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn world(grid_size: usize, max_hazards: usize, hazard_size: usize) -> WorldConfig {
    WorldConfig {
        grid_size,
        max_hazards,
        hazard_size,
        default_reward: -0.01,
        hazard_reward: -1.0,
        goal_reward: 10.0,
        placement_attempts: 1000,
        seed: None,
    }
}

/// 5x5 world with a single 2x2 hazard anchored at (1, 1): states 6, 7, 11, 12.
fn fixed_world() -> GridEnvironment {
    GridEnvironment::with_hazards(&world(5, 1, 2), vec![Hazard::new(1, 1, 2)]).unwrap()
}

#[test]
fn geometry() {
    let env = fixed_world();
    assert_eq!(env.num_states(), 25);
    assert_eq!(env.goal_state(), 24);
    assert_eq!(env.coords(13), (2, 3));
    assert_eq!(env.state_at(4, 4), 24);
}

#[test]
fn transitions_clamp_at_every_edge() {
    let env = fixed_world();
    let n = env.grid_size();
    for i in 0..n {
        let top = env.state_at(0, i);
        let bottom = env.state_at(n - 1, i);
        let left = env.state_at(i, 0);
        let right = env.state_at(i, n - 1);
        assert_eq!(env.transition(top, Action::Up).unwrap(), top);
        assert_eq!(env.transition(bottom, Action::Down).unwrap(), bottom);
        assert_eq!(env.transition(left, Action::Left).unwrap(), left);
        assert_eq!(env.transition(right, Action::Right).unwrap(), right);
    }
}

#[test]
fn interior_transitions_move_one_cell() {
    let env = fixed_world();
    assert_eq!(env.transition(12, Action::Up).unwrap(), 7);
    assert_eq!(env.transition(12, Action::Down).unwrap(), 17);
    assert_eq!(env.transition(12, Action::Left).unwrap(), 11);
    assert_eq!(env.transition(12, Action::Right).unwrap(), 13);
}

#[test]
fn transition_rejects_unknown_state() {
    let env = fixed_world();
    assert!(matches!(
        env.transition(25, Action::Up),
        Err(EngineError::StateOutOfRange { state: 25, num_states: 25 })
    ));
}

#[test]
fn hazard_containment() {
    let env = fixed_world();
    for state in [6, 7, 11, 12] {
        assert!(env.is_hazard(state), "state {state} should be a hazard");
    }
    // One step outside the square on each side.
    for state in [1, 2, 5, 8, 10, 13, 16, 17] {
        assert!(!env.is_hazard(state), "state {state} should be clear");
    }
    assert!(!env.is_hazard(99));
}

#[test]
fn reward_priority() {
    let env = fixed_world();
    assert_eq!(env.reward(23, Action::Right, 24), 10.0);
    assert_eq!(env.reward(1, Action::Down, 6), -1.0);
    assert_eq!(env.reward(0, Action::Right, 1), -0.01);
}

#[test]
fn construction_rejects_hazard_over_goal() {
    let err = GridEnvironment::with_hazards(&world(5, 1, 2), vec![Hazard::new(3, 3, 2)]);
    assert!(matches!(err, Err(EngineError::InvalidWorld(_))));
}

#[test]
fn construction_rejects_start_and_overlap() {
    let config = world(5, 2, 2);
    assert!(GridEnvironment::with_hazards(&config, vec![Hazard::new(0, 0, 2)]).is_err());
    assert!(GridEnvironment::with_hazards(
        &config,
        vec![Hazard::new(1, 1, 2), Hazard::new(2, 2, 2)]
    )
    .is_err());
}

#[test]
fn construction_rejects_hazard_of_wrong_size() {
    let err = GridEnvironment::with_hazards(&world(5, 1, 2), vec![Hazard::new(1, 1, 1)]);
    assert!(matches!(err, Err(EngineError::InvalidWorld(_))));

    let env = GridEnvironment::with_hazards(&world(6, 1, 3), vec![Hazard::new(1, 1, 3)]).unwrap();
    assert_eq!(env.hazard_size(), 3);
}

#[test]
fn construction_rejects_non_finite_rewards() {
    let mut config = world(5, 1, 2);
    config.hazard_reward = f64::NEG_INFINITY;
    assert!(GridEnvironment::new(&config, ChaCha20Rng::seed_from_u64(1)).is_err());
}

#[test]
fn corner_actions() {
    let env = fixed_world();
    assert_eq!(
        env.available_actions(0).unwrap(),
        vec![Action::Down, Action::Right]
    );
    assert_eq!(
        env.available_actions(24).unwrap(),
        vec![Action::Up, Action::Left]
    );
    assert_eq!(
        env.available_actions(4).unwrap(),
        vec![Action::Down, Action::Left]
    );
    assert_eq!(env.available_actions(12).unwrap().len(), 4);
}

#[test]
fn available_rewards_align_with_actions() {
    let env = fixed_world();
    // From 1: DOWN lands on hazard 6, LEFT on start, RIGHT on 2.
    assert_eq!(
        env.available_actions(1).unwrap(),
        vec![Action::Down, Action::Left, Action::Right]
    );
    assert_eq!(env.available_rewards(1).unwrap(), vec![-1.0, -0.01, -0.01]);
    // From 19: DOWN reaches the goal.
    assert_eq!(env.available_rewards(19).unwrap()[1], 10.0);
}

#[test]
fn only_goal_is_terminal() {
    let env = fixed_world();
    assert!(env.is_terminal(24));
    assert!((0..24).all(|s| !env.is_terminal(s)));
}

#[test]
fn walk_through_hazard_to_goal() {
    let env = fixed_world();
    let mut state = START_STATE;

    let step = env.step(state, Action::Right).unwrap();
    assert_eq!((step.next_state, step.reward, step.terminal), (1, -0.01, false));
    state = step.next_state;

    let step = env.step(state, Action::Down).unwrap();
    assert_eq!((step.next_state, step.reward), (6, -1.0));
    state = step.next_state;

    for action in [Action::Right, Action::Right, Action::Right] {
        state = env.step(state, action).unwrap().next_state;
    }
    assert_eq!(state, 9);
    for _ in 0..2 {
        state = env.step(state, Action::Down).unwrap().next_state;
    }
    assert_eq!(state, 19);

    let step = env.step(state, Action::Down).unwrap();
    assert_eq!(step.next_state, 24);
    assert_eq!(step.reward, 10.0);
    assert!(step.terminal);
}

#[test]
fn random_world_is_reproducible_from_seed() {
    let config = world(6, 3, 2);
    let a = GridEnvironment::new(&config, ChaCha20Rng::seed_from_u64(11)).unwrap();
    let b = GridEnvironment::new(&config, ChaCha20Rng::seed_from_u64(11)).unwrap();
    assert_eq!(a.hazards(), b.hazards());
    assert_eq!(a.hazards().len(), 3);
}

#[test]
fn reset_rerolls_random_layout_and_keeps_fixed_layout() {
    let mut random = GridEnvironment::new(&world(8, 3, 2), ChaCha20Rng::seed_from_u64(3)).unwrap();
    let layouts: Vec<Vec<Hazard>> = (0..10)
        .map(|_| {
            random.reset().unwrap();
            random.hazards().to_vec()
        })
        .collect();
    assert!(layouts.windows(2).any(|w| w[0] != w[1]));
    assert!(layouts.iter().all(|l| l.len() == 3));

    let mut fixed = fixed_world();
    fixed.clear_hazards();
    assert!(fixed.hazards().is_empty());
    assert_eq!(fixed.reset().unwrap(), START_STATE);
    assert_eq!(fixed.hazards(), &[Hazard::new(1, 1, 2)]);
}

#[test]
fn infeasible_configuration_fails_at_construction() {
    let result = GridEnvironment::new(&world(3, 3, 2), ChaCha20Rng::seed_from_u64(0));
    assert!(matches!(
        result,
        Err(EngineError::HazardPlacementInfeasible { requested: 3, .. })
    ));
}

#[test]
fn check_state_validates_wire_values() {
    let env = fixed_world();
    assert_eq!(env.check_state(24), Ok(24));
    assert!(env.check_state(25).is_err());
    assert!(env.check_state(-1).is_err());
}

#[test]
fn render_marks_cells() {
    let env = fixed_world();
    let board = env.render(2);
    let rows: Vec<&str> = board.lines().collect();
    assert_eq!(rows[0], "S.A..");
    assert_eq!(rows[1], ".~~..");
    assert_eq!(rows[4], "....G");
}
