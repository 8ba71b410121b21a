#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Session driver against a simulated pane: full-history turns, the
//! visible-only fallback, timeouts, lost sessions and state guardrails.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_agent::driver::SessionDriver;
use parley_agent::error::AgentError;
use parley_agent::event::{InMemoryEventSink, NullEventSink, SessionEventKind};
use parley_agent::mock::{PaneCall, ScriptedReply, SimulatedPane};
use parley_agent::types::SessionState;
use parley_core::{Config, ParticipantConfig};

const TARGET: &str = "parley:0.0";
const GENEROUS: Duration = Duration::from_secs(2);

fn participant() -> ParticipantConfig {
    let mut config = ParticipantConfig::new(TARGET);
    config.ready_indicators = vec!["> ".to_string()];
    config.loading_indicators = vec!["esc to interrupt".to_string()];
    config.check_interval = Duration::from_millis(5);
    config.stable_checks_required = 2;
    config.startup_timeout = GENEROUS;
    config.response_timeout = GENEROUS;
    config.post_ready_delay = Duration::ZERO;
    config.text_enter_delay = Duration::ZERO;
    config
}

fn driver(pane: &Arc<SimulatedPane>) -> (SessionDriver, Arc<InMemoryEventSink>) {
    let events = Arc::new(InMemoryEventSink::new());
    let driver = SessionDriver::new("claude", participant(), pane.clone())
        .with_event_sink(events.clone());
    (driver, events)
}

async fn started(pane: &Arc<SimulatedPane>) -> (SessionDriver, Arc<InMemoryEventSink>) {
    let (mut driver, events) = driver(pane);
    driver.start_session().await.unwrap();
    assert_eq!(driver.state(), SessionState::Ready);
    (driver, events)
}

#[tokio::test]
async fn full_history_turn_is_cleaned() {
    let pane = Arc::new(SimulatedPane::new(TARGET).with_replies([ScriptedReply::lines([
        "Hello there.",
        "    indented detail",
        "Done.",
    ])]));
    let (mut driver, events) = started(&pane).await;

    let turn = driver.dispatch_turn("hi", GENEROUS).await.unwrap();
    assert_eq!(turn.speaker_id, "claude");
    assert_eq!(turn.input, "hi");
    assert_eq!(turn.cleaned_text, "Hello there.\n    indented detail\nDone.");
    assert!(!turn.timed_out);
    assert!(!turn.used_fallback);
    assert!(!turn.raw_delta.truncated);
    assert!(!turn.raw_delta.degraded);
    assert!(turn.completed_at >= turn.started_at);
    assert_eq!(driver.state(), SessionState::Ready);

    assert_eq!(pane.sent_texts(), vec!["hi".to_string()]);
    assert_eq!(
        events.kinds(),
        vec![
            SessionEventKind::Started,
            SessionEventKind::TurnDispatched,
            SessionEventKind::TurnCompleted,
        ]
    );
}

#[tokio::test]
async fn broken_history_capture_falls_back_without_mixing_modes() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .with_broken_full_history()
            .with_replies([ScriptedReply::lines(["visible answer"])]),
    );
    let (mut driver, events) = started(&pane).await;

    let turn = driver.dispatch_turn("question", GENEROUS).await.unwrap();
    assert!(turn.used_fallback);
    assert!(turn.raw_delta.degraded);
    assert_eq!(turn.cleaned_text, "visible answer");
    assert!(events.kinds().contains(&SessionEventKind::CaptureDegraded));

    // One failed history attempt for the baseline; everything after the
    // input went out is visible-only.
    let calls = pane.calls();
    let sent = calls
        .iter()
        .position(|c| matches!(c, PaneCall::SendText(_)))
        .unwrap();
    let full_attempts = calls
        .iter()
        .filter(|c| matches!(c, PaneCall::CaptureFull))
        .count();
    assert_eq!(full_attempts, 1);
    assert!(calls[sent..]
        .iter()
        .all(|c| !matches!(c, PaneCall::CaptureFull)));
}

#[tokio::test]
async fn pane_without_scrollback_uses_visible_capture_directly() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .without_full_history()
            .with_replies([ScriptedReply::lines(["ok"])]),
    );
    let (mut driver, _events) = started(&pane).await;

    let turn = driver.dispatch_turn("ping", GENEROUS).await.unwrap();
    assert!(turn.used_fallback);
    assert_eq!(turn.cleaned_text, "ok");
    assert!(!pane.calls().contains(&PaneCall::CaptureFull));
    assert!(!driver.capability().unwrap().supports_full_history);
}

#[tokio::test]
async fn capability_is_probed_on_every_dispatch() {
    let pane = Arc::new(SimulatedPane::new(TARGET).with_replies([
        ScriptedReply::lines(["one"]),
        ScriptedReply::lines(["two"]),
    ]));
    let (mut driver, _events) = started(&pane).await;

    driver.dispatch_turn("a", GENEROUS).await.unwrap();
    driver.dispatch_turn("b", GENEROUS).await.unwrap();
    let probes = pane
        .calls()
        .iter()
        .filter(|c| matches!(c, PaneCall::Capability))
        .count();
    assert_eq!(probes, 2);
}

#[tokio::test]
async fn restored_scrollback_upgrades_the_next_turn() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .without_full_history()
            .with_replies([ScriptedReply::lines(["one"]), ScriptedReply::lines(["two"])]),
    );
    let (mut driver, events) = started(&pane).await;

    let first = driver.dispatch_turn("a", GENEROUS).await.unwrap();
    assert!(first.used_fallback);
    assert!(first.raw_delta.degraded);
    assert_eq!(first.cleaned_text, "one");

    pane.set_full_history(true);
    let second = driver.dispatch_turn("b", GENEROUS).await.unwrap();
    assert!(!second.used_fallback);
    assert!(!second.raw_delta.degraded);
    assert_eq!(second.cleaned_text, "two");
    assert!(driver.capability().unwrap().supports_full_history);

    let degraded = events
        .kinds()
        .into_iter()
        .filter(|k| *k == SessionEventKind::CaptureDegraded)
        .count();
    assert_eq!(degraded, 1);
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn degraded_capture_is_logged_with_a_silent_sink() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .without_full_history()
            .with_replies([ScriptedReply::lines(["ok"])]),
    );
    let mut driver = SessionDriver::new("claude", participant(), pane.clone())
        .with_event_sink(Arc::new(NullEventSink));
    driver.start_session().await.unwrap();
    let turn = driver.dispatch_turn("ping", GENEROUS).await.unwrap();
    assert!(turn.used_fallback);

    let text = log.text();
    assert!(text.contains("WARN"), "{text}");
    assert!(text.contains("visible-only"), "{text}");
    assert!(text.contains("participant=claude"), "{text}");
    assert!(text.contains(TARGET), "{text}");
}

fn long_reply() -> ScriptedReply {
    ScriptedReply::lines((0..20).map(|i| format!("r{i}")))
}

#[tokio::test]
async fn reply_longer_than_scrollback_is_truncated() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .with_history_limit(6)
            .with_replies([long_reply()]),
    );
    let (mut driver, events) = started(&pane).await;

    let turn = driver.dispatch_turn("count", GENEROUS).await.unwrap();
    assert!(turn.raw_delta.truncated);
    assert!(!turn.used_fallback);
    assert!(!turn.timed_out);
    assert_eq!(turn.cleaned_text, "r15\nr16\nr17\nr18\nr19");
    assert_eq!(
        events.kinds(),
        vec![
            SessionEventKind::Started,
            SessionEventKind::TurnDispatched,
            SessionEventKind::AlignmentLost,
            SessionEventKind::TurnCompleted,
        ]
    );
}

#[tokio::test]
async fn reply_taller_than_the_viewport_is_truncated_in_visible_mode() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET)
            .with_rows(6)
            .without_full_history()
            .with_replies([long_reply()]),
    );
    let (mut driver, events) = started(&pane).await;

    let turn = driver.dispatch_turn("count", GENEROUS).await.unwrap();
    assert!(turn.used_fallback);
    assert!(turn.raw_delta.degraded);
    assert!(turn.raw_delta.truncated);
    assert_eq!(turn.cleaned_text, "r15\nr16\nr17\nr18\nr19");
    let kinds = events.kinds();
    assert!(kinds.contains(&SessionEventKind::CaptureDegraded));
    assert!(kinds.contains(&SessionEventKind::AlignmentLost));
}

#[tokio::test]
async fn stalled_response_times_out_and_session_stays_usable() {
    let pane = Arc::new(SimulatedPane::new(TARGET).with_replies([
        ScriptedReply::stall(["Thinking about it", "partial answer"]),
        ScriptedReply::lines(["recovered"]),
    ]));
    let (mut driver, events) = started(&pane).await;

    let stalled = driver
        .dispatch_turn("q1", Duration::from_millis(120))
        .await
        .unwrap();
    assert!(stalled.timed_out);
    assert_eq!(stalled.cleaned_text, "Thinking about it\npartial answer");
    assert_eq!(driver.state(), SessionState::Ready);
    assert!(events.kinds().contains(&SessionEventKind::TurnTimedOut));

    let next = driver.dispatch_turn("q2", GENEROUS).await.unwrap();
    assert!(!next.timed_out);
    assert_eq!(next.cleaned_text, "recovered");
}

#[tokio::test]
async fn timed_out_turn_converts_to_response_timeout() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET).with_replies([ScriptedReply::stall(Vec::<String>::new())]),
    );
    let (mut driver, _events) = started(&pane).await;

    let timeout = Duration::from_millis(60);
    let turn = driver.dispatch_turn("q", timeout).await.unwrap();
    let err = turn.into_result(timeout).unwrap_err();
    assert!(matches!(err, AgentError::ResponseTimeout { .. }));
    assert!(!err.is_fatal_to_conversation());
}

#[tokio::test]
async fn crash_mid_turn_is_session_lost() {
    let pane = Arc::new(SimulatedPane::new(TARGET).with_replies([ScriptedReply::Crash]));
    let (mut driver, events) = started(&pane).await;

    let err = driver.dispatch_turn("boom", GENEROUS).await.unwrap_err();
    assert_eq!(
        err,
        AgentError::SessionLost {
            participant: "claude".into(),
            target: TARGET.into(),
        }
    );
    assert!(err.is_fatal_to_conversation());
    assert_eq!(driver.state(), SessionState::Failed);
    assert!(events.kinds().contains(&SessionEventKind::SessionLost));

    let again = driver.dispatch_turn("hello?", GENEROUS).await.unwrap_err();
    assert!(matches!(again, AgentError::InvalidState { .. }));
}

#[tokio::test]
async fn dispatch_before_start_is_rejected() {
    let pane = Arc::new(SimulatedPane::new(TARGET));
    let (mut driver, _events) = driver(&pane);

    let err = driver.dispatch_turn("too early", GENEROUS).await.unwrap_err();
    assert_eq!(
        err,
        AgentError::InvalidState {
            participant: "claude".into(),
            state: "idle".into(),
            operation: "dispatch_turn".into(),
        }
    );
    assert_eq!(driver.state(), SessionState::Idle);
    assert!(pane.sent_texts().is_empty());
}

#[tokio::test]
async fn startup_without_ready_signal_times_out() {
    let pane = Arc::new(SimulatedPane::new(TARGET));
    let mut config = participant();
    config.startup_ready_indicators = vec!["Welcome to the agent".to_string()];
    config.startup_timeout = Duration::from_millis(80);
    let events = Arc::new(InMemoryEventSink::new());
    let mut driver =
        SessionDriver::new("codex", config, pane.clone()).with_event_sink(events.clone());

    let err = driver.start_session().await.unwrap_err();
    assert!(matches!(err, AgentError::StartupTimeout { .. }));
    assert_eq!(driver.state(), SessionState::Failed);
    assert_eq!(events.kinds(), vec![SessionEventKind::StartupTimedOut]);

    let retry = driver.start_session().await.unwrap_err();
    assert!(matches!(retry, AgentError::InvalidState { .. }));
}

#[tokio::test]
async fn startup_on_missing_pane_is_session_lost() {
    let pane = Arc::new(SimulatedPane::new(TARGET));
    pane.kill();
    let (mut driver, _events) = driver(&pane);

    let err = driver.start_session().await.unwrap_err();
    assert!(matches!(err, AgentError::SessionLost { .. }));
    assert_eq!(driver.state(), SessionState::Failed);
}

#[tokio::test]
async fn multi_line_input_echo_is_not_part_of_the_turn() {
    let pane = Arc::new(
        SimulatedPane::new(TARGET).with_replies([ScriptedReply::lines(["Both noted."])]),
    );
    let (mut driver, _events) = started(&pane).await;

    let turn = driver
        .dispatch_turn("first point\nsecond point", GENEROUS)
        .await
        .unwrap();
    assert_eq!(turn.cleaned_text, "Both noted.");
}

#[tokio::test]
async fn driver_is_built_from_yaml_config() {
    let config = Config::from_yaml_str(
        r#"
capture:
  tail_limit: 50
participants:
  claude:
    target: "parley:0.0"
    ready_indicators: ["> "]
    check_interval_ms: 5
    stable_checks_required: 2
    post_ready_delay_ms: 0
    text_enter_delay_ms: 0
"#,
    )
    .unwrap();
    let pane = Arc::new(SimulatedPane::new(TARGET).with_replies([ScriptedReply::lines(["yes"])]));

    let mut driver = SessionDriver::from_config("claude", &config, pane.clone()).unwrap();
    assert_eq!(driver.target(), TARGET);
    assert!(SessionDriver::from_config("nobody", &config, pane.clone()).is_none());

    driver.start_session().await.unwrap();
    let turn = driver.dispatch_turn("ok?", GENEROUS).await.unwrap();
    assert_eq!(turn.cleaned_text, "yes");
}
