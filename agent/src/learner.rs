//! The agent's training loop.
//!
//! The learner keeps its own [`ValueStore`], applies one-step Q and V
//! updates after every reward it receives, and reports the new values to
//! the server, which holds an independent copy of the tables.

use anyhow::{bail, Result};
use engine_core::{Action, StateId, ValueStore};
use indicatif::ProgressBar;
use puddle_server::{EpisodeSummary, ErrorKind, Request, Response};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::policy::EpsilonGreedy;
use crate::stats::AgentStats;
use crate::transport::Transport;

/// Give up after this many error-only exchanges in a row.
const MAX_CONSECUTIVE_ERRORS: u32 = 8;

/// What the learner currently believes about its position.
#[derive(Debug, Default)]
struct View {
    state: Option<StateId>,
    actions: Vec<Action>,
}

/// Result of absorbing one batch of responses.
#[derive(Debug, PartialEq)]
enum Absorbed {
    Ready,
    Failed,
    Complete,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub episodes: u32,
    pub successful_episodes: u32,
    pub completed: bool,
    pub epsilon: f64,
}

pub struct Learner {
    agent_id: String,
    transport: Box<dyn Transport>,
    values: ValueStore,
    policy: EpsilonGreedy,
    alpha: f64,
    gamma: f64,
    log_interval: u32,
    stats: Arc<AgentStats>,
    progress: Option<ProgressBar>,
    shutdown: Arc<AtomicBool>,
    view: View,
    successful_episodes: u32,
}

impl Learner {
    pub fn new(
        config: &Config,
        transport: Box<dyn Transport>,
        stats: Arc<AgentStats>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let values = if config.random_q_init {
            ValueStore::with_random_q(config.num_states(), &mut rng)
        } else {
            ValueStore::new(config.num_states())
        };
        let policy = EpsilonGreedy::new(
            config.epsilon,
            config.epsilon_decay,
            config.min_epsilon,
            ChaCha20Rng::seed_from_u64(rng.gen()),
        );

        Self {
            agent_id: config.agent_id.trim().to_string(),
            transport,
            values,
            policy,
            alpha: config.alpha,
            gamma: config.gamma,
            log_interval: config.log_interval,
            stats,
            progress: None,
            shutdown,
            view: View::default(),
            successful_episodes: 0,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The learner's own value tables.
    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    async fn send(&self, request: Request) -> Result<Vec<Response>> {
        self.transport.send(&request).await
    }

    /// Join, play until the server reports training complete (or shutdown
    /// is requested), then leave.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let joined = self
            .send(Request::Join {
                agent_id: self.agent_id.clone(),
            })
            .await?;
        if let Some(Response::Error { error_message, .. }) = joined.first() {
            bail!("Join rejected: {}", error_message);
        }
        info!(agent_id = %self.agent_id, "Joined server");

        let mut responses = self.get_state().await?;
        let mut consecutive_errors = 0;
        let mut completed = false;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping learner");
                break;
            }

            match self.absorb(responses).await? {
                Absorbed::Complete => {
                    completed = true;
                    break;
                }
                Absorbed::Failed => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        bail!(
                            "Giving up after {} consecutive protocol errors",
                            consecutive_errors
                        );
                    }
                    responses = self.resync().await?;
                    continue;
                }
                Absorbed::Ready => consecutive_errors = 0,
            }

            let Some(state) = self.view.state else {
                responses = self.resync().await?;
                continue;
            };
            match self.policy.select(&self.values, state, &self.view.actions)? {
                Some(action) => {
                    responses = self
                        .send(Request::ActionMove {
                            agent_id: self.agent_id.clone(),
                            action: action.code() as i64,
                            state_id: state as i64,
                        })
                        .await?;
                }
                None => responses = self.resync().await?,
            }
        }

        let farewell = if completed {
            Request::TrainingComplete {
                agent_id: self.agent_id.clone(),
            }
        } else {
            Request::Leave {
                agent_id: self.agent_id.clone(),
            }
        };
        if let Err(e) = self.send(farewell).await {
            warn!("Failed to leave cleanly: {}", e);
        }

        if let Some(ref pb) = self.progress {
            pb.finish_with_message("done");
        }
        self.stats.write_stats(self.policy.epsilon());

        let summary = RunSummary {
            episodes: self.stats.episodes_completed(),
            successful_episodes: self.successful_episodes,
            completed,
            epsilon: self.policy.epsilon(),
        };
        info!(
            agent_id = %self.agent_id,
            episodes = summary.episodes,
            successful_episodes = summary.successful_episodes,
            epsilon = summary.epsilon,
            "Learner finished"
        );
        Ok(summary)
    }

    async fn get_state(&self) -> Result<Vec<Response>> {
        self.send(Request::GetState {
            agent_id: self.agent_id.clone(),
        })
        .await
    }

    async fn resync(&mut self) -> Result<Vec<Response>> {
        self.stats.record_resync();
        self.view = View::default();
        self.get_state().await
    }

    async fn absorb(&mut self, responses: Vec<Response>) -> Result<Absorbed> {
        let mut outcome = Absorbed::Ready;
        for response in responses {
            match response {
                Response::State { state_id } | Response::Reset { state_id } => {
                    self.view.state = Some(state_id);
                    self.view.actions.clear();
                }
                Response::AvailableActions { state_id, actions } => {
                    self.view.state = Some(state_id);
                    self.view.actions = actions
                        .into_iter()
                        .map(|code| Action::from_code(code as i64))
                        .collect::<Result<Vec<_>, _>>()?;
                }
                Response::AvailableRewards { state_id, rewards } => {
                    debug!(state_id, ?rewards, "Available rewards");
                }
                Response::ActionReward {
                    action,
                    reward,
                    next_state_id,
                } => {
                    let action = Action::from_code(action as i64)?;
                    if let Some(state) = self.view.state {
                        self.learn(state, action, reward, next_state_id).await?;
                    }
                    self.view.state = Some(next_state_id);
                    self.view.actions.clear();
                }
                Response::FinalState(summary) => self.finish_episode(&summary),
                Response::TrainingComplete {
                    total_episodes,
                    successful_episodes,
                    ..
                } => {
                    info!(total_episodes, successful_episodes, "Server reports training complete");
                    outcome = Absorbed::Complete;
                }
                Response::Error {
                    kind,
                    error_message,
                } => {
                    self.stats.record_protocol_error();
                    if kind == ErrorKind::StateMismatch {
                        info!("{}; resynchronizing", error_message);
                    } else {
                        warn!(%kind, "Server error: {}", error_message);
                    }
                    if outcome != Absorbed::Complete {
                        outcome = Absorbed::Failed;
                    }
                }
                Response::Info(summary) => debug!(?summary, "Info"),
                Response::Joined { .. } | Response::Left { .. } => {}
            }
        }
        Ok(outcome)
    }

    /// Apply the local updates for one transition and report the new
    /// values to the server.
    async fn learn(
        &mut self,
        state: StateId,
        action: Action,
        reward: f64,
        next_state: StateId,
    ) -> Result<()> {
        self.values
            .apply_q_update(state, action, reward, next_state, self.alpha, self.gamma)?;
        self.values
            .apply_v_update(state, reward, next_state, self.alpha, self.gamma)?;

        let updates = [
            Request::QUpdate {
                agent_id: self.agent_id.clone(),
                state_ids: vec![state as i64],
                action_indices: vec![action.code() as i64],
                q_values: vec![self.values.get_q(state, action)?],
            },
            Request::VUpdate {
                agent_id: self.agent_id.clone(),
                state_ids: vec![state as i64],
                v_values: vec![self.values.get_v(state)?],
            },
        ];
        for update in updates {
            for response in self.send(update).await? {
                if let Response::Error { error_message, .. } = response {
                    self.stats.record_protocol_error();
                    warn!("Value update rejected: {}", error_message);
                }
            }
        }
        Ok(())
    }

    fn finish_episode(&mut self, summary: &EpisodeSummary) {
        self.stats.record_episode(
            summary.steps_this_episode,
            summary.cumulative_reward,
            summary.success,
        );
        if summary.success {
            self.successful_episodes += 1;
        }
        self.policy.decay();

        if let Some(ref pb) = self.progress {
            pb.inc(1);
        }

        let episode = summary.total_episodes;
        if self.log_interval > 0 && episode % self.log_interval == 0 {
            let log = || {
                info!(
                    episode,
                    steps = summary.steps_this_episode,
                    cumulative_reward = summary.cumulative_reward,
                    successful_episodes = summary.successful_episodes,
                    epsilon = self.policy.epsilon(),
                    "Completed {} episodes",
                    episode
                )
            };
            match self.progress {
                Some(ref pb) => pb.suspend(log),
                None => log(),
            }
            self.stats.write_stats(self.policy.epsilon());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use async_trait::async_trait;
    use engine_config::StopMethod;
    use puddle_server::{ProtocolHandler, SessionRegistry, SessionSettings};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn config(data_dir: &str) -> Config {
        Config {
            agent_id: "learner".into(),
            server_url: "http://unused".into(),
            local: true,
            log_level: "info".into(),
            log_interval: 1,
            data_dir: data_dir.into(),
            grid_size: 5,
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.5,
            epsilon_decay: 0.9,
            min_epsilon: 0.05,
            random_q_init: true,
            seed: Some(3),
        }
    }

    fn handler(max_episodes: u32) -> Arc<ProtocolHandler> {
        let mut settings = SessionSettings::default();
        settings.world.grid_size = 5;
        settings.world.seed = Some(9);
        settings.episode.max_steps_per_episode = 30;
        settings.episode.max_episodes = max_episodes;
        settings.episode.stop_method = StopMethod::StepLimit;
        Arc::new(ProtocolHandler::new(Arc::new(SessionRegistry::new(
            settings,
        ))))
    }

    /// Forwards to an in-process handler, recording requests and
    /// optionally corrupting the first move's claimed state.
    struct Recording {
        inner: LocalTransport,
        sent: Arc<Mutex<Vec<Request>>>,
        corrupt_first_move: Mutex<bool>,
    }

    impl Recording {
        fn take_corruption(&self) -> bool {
            let mut corrupt = self.corrupt_first_move.lock().unwrap();
            std::mem::replace(&mut *corrupt, false)
        }
    }

    #[async_trait]
    impl Transport for Recording {
        async fn send(&self, request: &Request) -> Result<Vec<Response>> {
            let request = match request {
                Request::ActionMove {
                    agent_id,
                    action,
                    state_id,
                } if self.take_corruption() => Request::ActionMove {
                    agent_id: agent_id.clone(),
                    action: *action,
                    state_id: state_id + 1,
                },
                other => other.clone(),
            };
            self.sent.lock().unwrap().push(request.clone());
            self.inner.send(&request).await
        }
    }

    fn recording(
        handler: &Arc<ProtocolHandler>,
        corrupt: bool,
    ) -> (Box<dyn Transport>, Arc<Mutex<Vec<Request>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Recording {
            inner: LocalTransport::new(Arc::clone(handler)),
            sent: Arc::clone(&sent),
            corrupt_first_move: Mutex::new(corrupt),
        };
        (Box::new(transport), sent)
    }

    fn learner(cfg: &Config, transport: Box<dyn Transport>) -> (Learner, Arc<AgentStats>) {
        let stats = Arc::new(AgentStats::new(cfg.stats_path(), &cfg.agent_id));
        let learner = Learner::new(
            cfg,
            transport,
            Arc::clone(&stats),
            Arc::new(AtomicBool::new(false)),
        );
        (learner, stats)
    }

    #[tokio::test]
    async fn trains_until_server_reports_completion() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let handler = handler(3);
        let (transport, sent) = recording(&handler, false);
        let (mut learner, stats) = learner(&cfg, transport);

        let summary = learner.run().await.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.episodes, 3);
        assert!((summary.epsilon - 0.5 * 0.9 * 0.9 * 0.9).abs() < 1e-9);
        // The session is released once training completes.
        assert_eq!(handler.registry().active_count(), 0);
        assert!(cfg.stats_path().exists());
        assert_eq!(stats.snapshot(0.0).protocol_errors, 0);

        let sent = sent.lock().unwrap();
        assert!(matches!(sent.first(), Some(Request::Join { .. })));
        assert!(matches!(
            sent.last(),
            Some(Request::TrainingComplete { .. })
        ));
    }

    #[tokio::test]
    async fn reported_values_match_local_tables() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let handler = handler(1);
        let (transport, sent) = recording(&handler, false);
        let (mut learner, _) = learner(&cfg, transport);

        learner.run().await.unwrap();

        let sent = sent.lock().unwrap();
        let mut q_reports = 0;
        for request in sent.iter() {
            if let Request::QUpdate {
                state_ids,
                action_indices,
                q_values,
                ..
            } = request
            {
                q_reports += 1;
                assert_eq!(state_ids.len(), 1);
                assert_eq!(action_indices.len(), 1);
                assert!(q_values[0].is_finite());
            }
        }
        assert!(q_reports > 0);

        // The final report for each (state, action) is the learner's value.
        let last = sent
            .iter()
            .rev()
            .find_map(|r| match r {
                Request::QUpdate {
                    state_ids,
                    action_indices,
                    q_values,
                    ..
                } => Some((state_ids[0], action_indices[0], q_values[0])),
                _ => None,
            })
            .unwrap();
        let action = Action::from_code(last.1).unwrap();
        assert_eq!(
            learner.values().get_q(last.0 as usize, action).unwrap(),
            last.2
        );
    }

    #[tokio::test]
    async fn recovers_from_state_mismatch() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let handler = handler(2);
        let (transport, _) = recording(&handler, true);
        let (mut learner, stats) = learner(&cfg, transport);

        let summary = learner.run().await.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.episodes, 2);
        let snapshot = stats.snapshot(0.0);
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.resyncs, 1);
    }

    #[tokio::test]
    async fn shutdown_leaves_without_training() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let handler = handler(100);
        let stats = Arc::new(AgentStats::new(cfg.stats_path(), &cfg.agent_id));
        let mut learner = Learner::new(
            &cfg,
            Box::new(LocalTransport::new(Arc::clone(&handler))),
            stats,
            Arc::new(AtomicBool::new(true)),
        );

        let summary = learner.run().await.unwrap();

        assert!(!summary.completed);
        assert_eq!(summary.episodes, 0);
        assert_eq!(handler.registry().active_count(), 0);
    }
}
