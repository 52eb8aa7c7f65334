//! Request dispatch.
//!
//! [`ProtocolHandler`] turns one decoded [`Request`] into the list of
//! [`Response`]s the client should see. Every failure is confined to its
//! own exchange and reported as a single `error` response.

use engine_core::{Action, StateId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::metrics;
use crate::protocol::messages::{decode_request, Request, Response};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::{AgentSession, EpisodePhase};

/// Client and server cumulative rewards closer than this are in agreement.
const REWARD_TOLERANCE: f64 = 1e-9;

pub struct ProtocolHandler {
    registry: Arc<SessionRegistry>,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Decode and handle a raw JSON message.
    pub fn handle_json(&self, raw: &str) -> Vec<Response> {
        match decode_request(raw) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!(error = %e, "Rejected undecodable message");
                metrics::ERRORS.with_label_values(&[e.kind().as_str()]).inc();
                vec![Response::error(&e)]
            }
        }
    }

    /// Handle one request, converting any failure into an error response.
    pub fn handle(&self, request: Request) -> Vec<Response> {
        let kind = request.kind();
        let agent_id = request.agent_id().to_string();
        let start = Instant::now();
        metrics::REQUESTS.with_label_values(&[kind]).inc();

        let responses = match self.dispatch(request) {
            Ok(responses) => responses,
            Err(e) => {
                warn!(agent_id = %agent_id, request = kind, error = %e, "Request rejected");
                metrics::ERRORS.with_label_values(&[e.kind().as_str()]).inc();
                vec![Response::error(&e)]
            }
        };

        metrics::REQUEST_LATENCY
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());
        responses
    }

    fn dispatch(&self, request: Request) -> Result<Vec<Response>, ProtocolError> {
        match request {
            Request::Join { agent_id } => self.join(&agent_id),
            Request::Leave { agent_id } => Ok(vec![self.leave(&agent_id)]),
            Request::TrainingComplete { agent_id } => {
                self.session(&agent_id)?;
                Ok(vec![self.leave(&agent_id)])
            }
            Request::GetState { agent_id } => {
                let handle = self.session(&agent_id)?;
                let mut session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                // An episode left terminal by a failed conclusion is retried.
                if session.phase() == EpisodePhase::Terminal {
                    return conclude(&mut session);
                }
                snapshot(&mut session, true)
            }
            Request::GetAvailableActions { agent_id, state_id } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                let state = check_state(&session, state_id)?;
                Ok(vec![available_actions(&session, state)?])
            }
            Request::GetAvailableRewards { agent_id, state_id } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                let state = check_state(&session, state_id)?;
                Ok(vec![available_rewards(&session, state)?])
            }
            Request::ActionMove {
                agent_id,
                action,
                state_id,
            } => self.action_move(&agent_id, action, state_id),
            Request::ActionRewardReport {
                agent_id,
                action,
                reward,
                next_state_id,
            } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                let action =
                    Action::from_code(action).map_err(|_| ProtocolError::InvalidAction(action))?;
                let next_state = check_state(&session, next_state_id)?;
                if !reward.is_finite() {
                    return Err(ProtocolError::MalformedMessage(format!(
                        "reward must be finite, got {reward}"
                    )));
                }
                Ok(vec![Response::ActionReward {
                    action: action.code(),
                    reward,
                    next_state_id: next_state,
                }])
            }
            Request::FinalState {
                agent_id,
                is_terminal,
                cumulative_reward,
                steps_this_episode,
            } => self.final_state(&agent_id, is_terminal, cumulative_reward, steps_this_episode),
            Request::Reset { agent_id } => {
                let handle = self.session(&agent_id)?;
                let mut session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                let state = session.reset_game()?;
                let mut responses = vec![Response::Reset { state_id: state }];
                responses.extend(snapshot(&mut session, false)?);
                responses.push(Response::Info(session.summary()));
                Ok(responses)
            }
            Request::QUpdate {
                agent_id,
                state_ids,
                action_indices,
                q_values,
            } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                apply_q_updates(&handle, &state_ids, &action_indices, &q_values)?;
                Ok(Vec::new())
            }
            Request::VUpdate {
                agent_id,
                state_ids,
                v_values,
            } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                if session.is_training_complete() {
                    return Ok(vec![training_complete(&session)]);
                }
                apply_v_updates(&handle, &state_ids, &v_values)?;
                Ok(Vec::new())
            }
            Request::Info {
                agent_id,
                cumulative_reward,
                total_episodes,
                ..
            } => {
                let handle = self.session(&agent_id)?;
                let session = handle.lock();
                let summary = session.summary();
                if summary.total_episodes != total_episodes {
                    debug!(
                        agent_id = %agent_id,
                        client_episodes = total_episodes,
                        server_episodes = summary.total_episodes,
                        client_reward = cumulative_reward,
                        "Client episode count differs from server"
                    );
                }
                Ok(vec![Response::Info(summary)])
            }
        }
    }

    fn session(&self, agent_id: &str) -> Result<Arc<SessionHandle>, ProtocolError> {
        self.registry
            .get_session(agent_id)
            .ok_or_else(|| ProtocolError::SessionNotFound(agent_id.trim().to_string()))
    }

    fn join(&self, agent_id: &str) -> Result<Vec<Response>, ProtocolError> {
        let created = self.registry.add_session(agent_id)?;
        Ok(vec![Response::Joined {
            agent_id: agent_id.trim().to_string(),
            created,
            active_sessions: self.registry.active_count(),
        }])
    }

    fn leave(&self, agent_id: &str) -> Response {
        let removed = self.registry.remove_session(agent_id);
        Response::Left {
            agent_id: agent_id.trim().to_string(),
            removed,
            active_sessions: self.registry.active_count(),
        }
    }

    /// Apply a move and follow it with the next-state bundle, or with the
    /// episode summary and whatever comes after the episode.
    fn action_move(
        &self,
        agent_id: &str,
        action: i64,
        claimed_state: i64,
    ) -> Result<Vec<Response>, ProtocolError> {
        let handle = self.session(agent_id)?;
        let mut session = handle.lock();
        if session.is_training_complete() {
            return Ok(vec![training_complete(&session)]);
        }

        let current = session.current_state();
        if claimed_state != current as i64 {
            return Err(ProtocolError::StateMismatch {
                claimed: claimed_state,
                current,
            });
        }
        let action = Action::from_code(action).map_err(|_| ProtocolError::InvalidAction(action))?;
        if !session.environment().is_action_available(current, action) {
            return Err(ProtocolError::UnavailableAction {
                action,
                state: current,
            });
        }

        let outcome = session.take_action(action)?;
        metrics::STEPS_TAKEN.inc();
        let mut responses = vec![Response::ActionReward {
            action: outcome.action.code(),
            reward: outcome.reward,
            next_state_id: outcome.next_state,
        }];

        if outcome.termination.is_none() {
            responses.extend(snapshot(&mut session, false)?);
            return Ok(responses);
        }

        responses.extend(conclude(&mut session)?);
        Ok(responses)
    }

    /// Acknowledge a client's end-of-episode report with the server's
    /// authoritative summary.
    fn final_state(
        &self,
        agent_id: &str,
        is_terminal: bool,
        cumulative_reward: f64,
        steps_this_episode: u32,
    ) -> Result<Vec<Response>, ProtocolError> {
        let handle = self.session(agent_id)?;
        let mut session = handle.lock();
        if session.is_training_complete() {
            return Ok(vec![training_complete(&session)]);
        }

        if is_terminal {
            if let Some(conclusion) = session.conclude_episode()? {
                metrics::EPISODES_COMPLETED.inc();
                if conclusion.summary.success {
                    metrics::EPISODES_SUCCESSFUL.inc();
                }
            }
        }

        let summary = if is_terminal {
            session.last_summary().cloned()
        } else {
            None
        }
        .unwrap_or_else(|| session.summary());

        if (summary.cumulative_reward - cumulative_reward).abs() > REWARD_TOLERANCE
            || summary.steps_this_episode != steps_this_episode
        {
            warn!(
                agent_id = %agent_id,
                client_reward = cumulative_reward,
                server_reward = summary.cumulative_reward,
                client_steps = steps_this_episode,
                server_steps = summary.steps_this_episode,
                "Client episode report disagrees with server"
            );
        }
        Ok(vec![Response::FinalState(summary)])
    }
}

fn check_state(session: &AgentSession, state_id: i64) -> Result<StateId, ProtocolError> {
    session
        .environment()
        .check_state(state_id)
        .map_err(|_| ProtocolError::InvalidState(state_id))
}

fn available_actions(session: &AgentSession, state: StateId) -> Result<Response, ProtocolError> {
    let actions = session.environment().available_actions(state)?;
    Ok(Response::AvailableActions {
        state_id: state,
        actions: actions.into_iter().map(Action::code).collect(),
    })
}

fn available_rewards(session: &AgentSession, state: StateId) -> Result<Response, ProtocolError> {
    Ok(Response::AvailableRewards {
        state_id: state,
        rewards: session.environment().available_rewards(state)?,
    })
}

/// Actions and rewards for the current state, optionally led by the state
/// itself.
fn snapshot(session: &mut AgentSession, with_state: bool) -> Result<Vec<Response>, ProtocolError> {
    let state = session.current_state();
    let mut responses = Vec::with_capacity(3);
    if with_state {
        responses.push(Response::State { state_id: state });
    }
    responses.push(available_actions(session, state)?);
    responses.push(available_rewards(session, state)?);
    session.mark_snapshot_sent();
    Ok(responses)
}

/// Conclude a terminal episode: its summary, then either the
/// training-complete notice or the next episode's bundle.
fn conclude(session: &mut AgentSession) -> Result<Vec<Response>, ProtocolError> {
    let Some(conclusion) = session.conclude_episode()? else {
        return Ok(Vec::new());
    };
    metrics::EPISODES_COMPLETED.inc();
    if conclusion.summary.success {
        metrics::EPISODES_SUCCESSFUL.inc();
    }
    let mut responses = vec![Response::FinalState(conclusion.summary)];
    if conclusion.training_complete {
        responses.push(training_complete(session));
    } else {
        responses.extend(snapshot(session, true)?);
    }
    Ok(responses)
}

fn training_complete(session: &AgentSession) -> Response {
    Response::TrainingComplete {
        message: format!(
            "Training complete after {} episodes",
            session.episode_index()
        ),
        total_episodes: session.episode_index(),
        successful_episodes: session.successful_episodes(),
    }
}

fn parallel_len(lengths: &[(&str, usize)]) -> Result<usize, ProtocolError> {
    let (_, expected) = lengths[0];
    if lengths.iter().all(|(_, len)| *len == expected) {
        Ok(expected)
    } else {
        let detail: Vec<String> = lengths
            .iter()
            .map(|(name, len)| format!("{name}={len}"))
            .collect();
        Err(ProtocolError::MalformedMessage(format!(
            "parallel arrays differ in length ({})",
            detail.join(", ")
        )))
    }
}

fn checked_state(handle: &SessionHandle, state_id: i64) -> Result<StateId, ProtocolError> {
    usize::try_from(state_id)
        .ok()
        .filter(|s| *s < handle.values().num_states())
        .ok_or(ProtocolError::InvalidState(state_id))
}

fn checked_value(value: f64) -> Result<f64, ProtocolError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::MalformedMessage(format!(
            "value must be finite, got {value}"
        )))
    }
}

/// Validate the whole batch, then write it. A bad entry rejects the batch.
fn apply_q_updates(
    handle: &SessionHandle,
    state_ids: &[i64],
    action_indices: &[i64],
    q_values: &[f64],
) -> Result<(), ProtocolError> {
    parallel_len(&[
        ("state_ids", state_ids.len()),
        ("action_indices", action_indices.len()),
        ("q_values", q_values.len()),
    ])?;

    let entries = state_ids
        .iter()
        .zip(action_indices)
        .zip(q_values)
        .map(|((&state, &action), &value)| {
            Ok((
                checked_state(handle, state)?,
                Action::from_code(action).map_err(|_| ProtocolError::InvalidAction(action))?,
                checked_value(value)?,
            ))
        })
        .collect::<Result<Vec<_>, ProtocolError>>()?;

    let values = handle.values();
    for (state, action, value) in &entries {
        values.set_q(*state, *action, *value)?;
    }
    debug!(agent_id = handle.agent_id(), entries = entries.len(), "Applied Q update");
    Ok(())
}

fn apply_v_updates(
    handle: &SessionHandle,
    state_ids: &[i64],
    v_values: &[f64],
) -> Result<(), ProtocolError> {
    parallel_len(&[("state_ids", state_ids.len()), ("v_values", v_values.len())])?;

    let entries = state_ids
        .iter()
        .zip(v_values)
        .map(|(&state, &value)| Ok((checked_state(handle, state)?, checked_value(value)?)))
        .collect::<Result<Vec<_>, ProtocolError>>()?;

    let values = handle.values();
    for (state, value) in &entries {
        values.set_v(*state, *value)?;
    }
    debug!(agent_id = handle.agent_id(), entries = entries.len(), "Applied V update");
    Ok(())
}
