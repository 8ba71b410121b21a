//! Staged conversations across several session drivers.
//!
//! Turns are strictly sequential: each prompt is built from the previous
//! turn's cleaned text. Only session startup may run concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parley_core::Config;

use crate::driver::SessionDriver;
use crate::error::{AgentError, OrchestratorError};
use crate::tmux::PaneTransport;
use crate::types::{SessionState, StopReason, Transcript};

/// Picks who speaks next.
pub trait SpeakerSchedule: Send {
    /// `None` ends the conversation.
    fn next_speaker(&mut self, transcript: &Transcript) -> Option<String>;
}

/// Cycles through a fixed speaker list.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    speakers: Vec<String>,
}

impl RoundRobin {
    pub fn new<I, S>(speakers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            speakers: speakers.into_iter().map(Into::into).collect(),
        }
    }
}

impl SpeakerSchedule for RoundRobin {
    fn next_speaker(&mut self, transcript: &Transcript) -> Option<String> {
        if self.speakers.is_empty() {
            return None;
        }
        self.speakers
            .get(transcript.len() % self.speakers.len())
            .cloned()
    }
}

/// Plays a fixed speaker sequence once.
#[derive(Debug, Clone)]
pub struct ScriptedOrder {
    order: Vec<String>,
}

impl ScriptedOrder {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
        }
    }
}

impl SpeakerSchedule for ScriptedOrder {
    fn next_speaker(&mut self, transcript: &Transcript) -> Option<String> {
        self.order.get(transcript.len()).cloned()
    }
}

/// Builds the input for the next turn.
pub trait PromptComposer: Send + Sync {
    fn compose(&self, speaker: &str, transcript: &Transcript, opening: &str) -> String;
}

/// Relays the previous speaker's cleaned text verbatim. The first turn, and
/// any turn after an empty response, gets the opening input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayComposer;

impl PromptComposer for RelayComposer {
    fn compose(&self, _speaker: &str, transcript: &Transcript, opening: &str) -> String {
        match transcript.last() {
            Some(turn) if !turn.cleaned_text.trim().is_empty() => turn.cleaned_text.clone(),
            _ => opening.to_string(),
        }
    }
}

/// Fills `{previous}`, `{speaker}` and `{opening}` placeholders.
///
/// `{previous}` is empty on the first turn.
#[derive(Debug, Clone)]
pub struct TemplateComposer {
    template: String,
}

impl TemplateComposer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl PromptComposer for TemplateComposer {
    fn compose(&self, speaker: &str, transcript: &Transcript, opening: &str) -> String {
        let previous = transcript
            .last()
            .map(|turn| turn.cleaned_text.as_str())
            .unwrap_or_default();
        self.template
            .replace("{previous}", previous)
            .replace("{speaker}", speaker)
            .replace("{opening}", opening)
    }
}

/// Parameters for one [`TurnOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPlan {
    pub conversation_id: String,
    pub opening: String,
    pub max_turns: usize,
    /// A turn whose cleaned text contains any of these ends the conversation.
    pub terminal_phrases: Vec<String>,
    pub abort_on_timeout: bool,
    /// Overrides every participant's configured response timeout.
    pub response_timeout: Option<Duration>,
}

impl ConversationPlan {
    pub fn new(conversation_id: impl Into<String>, opening: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            opening: opening.into(),
            max_turns: 10,
            terminal_phrases: Vec::new(),
            abort_on_timeout: false,
            response_timeout: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_terminal_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_abort_on_timeout(mut self, abort: bool) -> Self {
        self.abort_on_timeout = abort;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    fn terminal_phrase_in(&self, text: &str) -> Option<&str> {
        self.terminal_phrases
            .iter()
            .find(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
            .map(String::as_str)
    }
}

pub struct TurnOrchestrator {
    drivers: Vec<SessionDriver>,
    schedule: Box<dyn SpeakerSchedule>,
    composer: Box<dyn PromptComposer>,
}

impl TurnOrchestrator {
    /// Round-robin over `drivers` in the given order, relaying each reply.
    pub fn new(drivers: Vec<SessionDriver>) -> Self {
        let speakers: Vec<String> = drivers
            .iter()
            .map(|d| d.participant_id().to_string())
            .collect();
        Self {
            drivers,
            schedule: Box::new(RoundRobin::new(speakers)),
            composer: Box::new(RelayComposer),
        }
    }

    /// One driver per configured participant, all on `transport`.
    pub fn from_config(config: &Config, transport: Arc<dyn PaneTransport>) -> Self {
        let drivers = config
            .participants
            .keys()
            .filter_map(|id| SessionDriver::from_config(id, config, Arc::clone(&transport)))
            .collect();
        Self::new(drivers)
    }

    pub fn with_schedule(mut self, schedule: impl SpeakerSchedule + 'static) -> Self {
        self.schedule = Box::new(schedule);
        self
    }

    pub fn with_composer(mut self, composer: impl PromptComposer + 'static) -> Self {
        self.composer = Box::new(composer);
        self
    }

    pub fn add(&mut self, driver: SessionDriver) {
        self.drivers.push(driver);
    }

    pub fn driver(&self, participant_id: &str) -> Option<&SessionDriver> {
        self.drivers
            .iter()
            .find(|d| d.participant_id() == participant_id)
    }

    pub fn drivers(&self) -> &[SessionDriver] {
        &self.drivers
    }

    /// Start every idle session concurrently.
    pub async fn start_all(&mut self) -> Result<(), OrchestratorError> {
        let pending = self
            .drivers
            .iter_mut()
            .filter(|d| d.state() == SessionState::Idle)
            .map(|d| d.start_session());
        let results = join_all(pending).await;

        match results.into_iter().find_map(Result::err) {
            Some(source) => Err(OrchestratorError::Startup {
                source,
                transcript: Transcript::default(),
            }),
            None => Ok(()),
        }
    }

    /// Run a conversation to completion.
    ///
    /// Idle sessions are started first. Timed-out turns are recorded and the
    /// conversation goes on unless the plan says otherwise; a lost session
    /// ends it with the partial transcript attached to the error.
    pub async fn run(&mut self, plan: &ConversationPlan) -> Result<Transcript, OrchestratorError> {
        let mut transcript = Transcript::new(plan.conversation_id.clone());
        if let Err(err) = self.start_all().await {
            return Err(match err {
                OrchestratorError::Startup { source, .. } => {
                    OrchestratorError::Startup { source, transcript }
                }
                other => other,
            });
        }

        tracing::info!(
            conversation = %plan.conversation_id,
            participants = self.drivers.len(),
            max_turns = plan.max_turns,
            "conversation started"
        );

        while transcript.len() < plan.max_turns {
            let Some(speaker) = self.schedule.next_speaker(&transcript) else {
                transcript.stop_reason = Some(StopReason::ScheduleExhausted);
                break;
            };
            let input = self.composer.compose(&speaker, &transcript, &plan.opening);

            let Some(driver) = self
                .drivers
                .iter_mut()
                .find(|d| d.participant_id() == speaker)
            else {
                return Err(OrchestratorError::UnknownSpeaker { speaker });
            };
            let timeout = plan
                .response_timeout
                .unwrap_or(driver.config().response_timeout);

            let turn = match driver.dispatch_turn(&input, timeout).await {
                Ok(turn) => turn,
                Err(source @ AgentError::SessionLost { .. }) => {
                    tracing::error!(
                        conversation = %plan.conversation_id,
                        speaker = %speaker,
                        turns = transcript.len(),
                        "session lost, ending conversation"
                    );
                    transcript.stop_reason = Some(StopReason::SessionLost {
                        speaker: speaker.clone(),
                    });
                    return Err(OrchestratorError::SessionLost {
                        speaker,
                        source,
                        transcript,
                    });
                }
                Err(source) => {
                    return Err(OrchestratorError::Turn {
                        speaker,
                        source,
                        transcript,
                    });
                }
            };

            let timed_out = turn.timed_out;
            let phrase = plan
                .terminal_phrase_in(&turn.cleaned_text)
                .map(str::to_string);
            transcript.push(turn);

            if let Some(phrase) = phrase {
                transcript.stop_reason = Some(StopReason::TerminalPhrase {
                    speaker: speaker.clone(),
                    phrase,
                });
                break;
            }
            if timed_out && plan.abort_on_timeout {
                transcript.stop_reason = Some(StopReason::TimedOutAbort { speaker });
                break;
            }
        }

        if transcript.stop_reason.is_none() {
            transcript.stop_reason = Some(StopReason::MaxTurns);
        }
        tracing::info!(
            conversation = %plan.conversation_id,
            turns = transcript.len(),
            stop_reason = ?transcript.stop_reason,
            "conversation finished"
        );
        Ok(transcript)
    }
}

impl std::fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOrchestrator")
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}
