use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::MessagingChannel;
use crate::ids::ConversationId;

/// Quiet period after the last keystroke before typing is reported stopped.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypingState {
    Idle,
    Typing { deadline: Instant },
}

/// Clock-driven typing state machine for one composer.
///
/// Every method returns the signal to forward, if any. The caller owns the
/// timer and calls [`TypingSession::timer_elapsed`] once [`deadline`] passes.
///
/// [`deadline`]: TypingSession::deadline
#[derive(Debug, Clone)]
pub struct TypingSession {
    state: TypingState,
    idle_timeout: Duration,
}

impl Default for TypingSession {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}

impl TypingSession {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: TypingState::Idle,
            idle_timeout,
        }
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.state, TypingState::Typing { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TypingState::Typing { deadline } => Some(deadline),
            TypingState::Idle => None,
        }
    }

    pub fn input_changed(
        &mut self,
        value: &str,
        disabled: bool,
        now: Instant,
    ) -> Option<TypingSignal> {
        if disabled || value.trim().is_empty() {
            return self.stop();
        }

        let was_typing = self.is_typing();
        // Each keystroke restarts the single idle deadline.
        self.state = TypingState::Typing {
            deadline: now + self.idle_timeout,
        };
        (!was_typing).then_some(TypingSignal::Started)
    }

    pub fn timer_elapsed(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.state {
            TypingState::Typing { deadline } if now >= deadline => self.stop(),
            TypingState::Typing { .. } | TypingState::Idle => None,
        }
    }

    pub fn message_sent(&mut self) -> Option<TypingSignal> {
        self.stop()
    }

    pub fn teardown(&mut self) -> Option<TypingSignal> {
        self.stop()
    }

    fn stop(&mut self) -> Option<TypingSignal> {
        match std::mem::replace(&mut self.state, TypingState::Idle) {
            TypingState::Typing { .. } => Some(TypingSignal::Stopped),
            TypingState::Idle => None,
        }
    }
}

#[derive(Debug)]
enum TypingCommand {
    Input { value: String, disabled: bool },
    Sent,
}

/// Runs a [`TypingSession`] on a background task and forwards its signals
/// to the messaging channel for one conversation.
///
/// Dropping the indicator (or awaiting [`TypingIndicator::shutdown`]) ends the
/// task: a final stop is emitted when typing, and the idle timer dies with
/// the task so it can never fire afterwards.
pub struct TypingIndicator {
    conversation_id: ConversationId,
    commands: Option<mpsc::UnboundedSender<TypingCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl TypingIndicator {
    pub fn spawn(
        conversation_id: ConversationId,
        channel: Arc<dyn MessagingChannel>,
        idle_timeout: Duration,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_typing_worker(
            conversation_id.clone(),
            channel,
            TypingSession::new(idle_timeout),
            receiver,
        ));

        Self {
            conversation_id,
            commands: Some(commands),
            worker: Some(worker),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn input_changed(&self, value: &str, disabled: bool) {
        self.send(TypingCommand::Input {
            value: value.to_string(),
            disabled,
        });
    }

    pub fn message_sent(&self) {
        self.send(TypingCommand::Sent);
    }

    /// Tears the indicator down and waits until the final signal went out.
    pub async fn shutdown(mut self) {
        self.commands = None;
        if let Some(worker) = self.worker.take()
            && let Err(error) = worker.await
        {
            tracing::warn!(
                "typing worker for {} ended abnormally: {}",
                self.conversation_id,
                error
            );
        }
    }

    fn send(&self, command: TypingCommand) {
        let Some(commands) = self.commands.as_ref() else {
            return;
        };
        if commands.send(command).is_err() {
            tracing::debug!("typing worker for {} is gone", self.conversation_id);
        }
    }
}

async fn run_typing_worker(
    conversation_id: ConversationId,
    channel: Arc<dyn MessagingChannel>,
    mut session: TypingSession,
    mut commands: mpsc::UnboundedReceiver<TypingCommand>,
) {
    loop {
        let deadline = session.deadline();
        let signal = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(TypingCommand::Input { value, disabled }) => {
                    session.input_changed(&value, disabled, Instant::now())
                }
                Some(TypingCommand::Sent) => session.message_sent(),
                None => {
                    emit(&*channel, &conversation_id, session.teardown());
                    break;
                }
            },
            _ = wait_for_deadline(deadline) => session.timer_elapsed(Instant::now()),
        };

        emit(&*channel, &conversation_id, signal);
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn emit(
    channel: &dyn MessagingChannel,
    conversation_id: &ConversationId,
    signal: Option<TypingSignal>,
) {
    match signal {
        Some(TypingSignal::Started) => channel.typing_started(conversation_id),
        Some(TypingSignal::Stopped) => channel.typing_stopped(conversation_id),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::loopback::{LoopbackChannel, PresenceSignal};

    const IDLE: Duration = Duration::from_millis(1000);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn burst_of_keystrokes_starts_once_and_stops_after_idle() {
        let origin = Instant::now();
        let mut session = TypingSession::new(IDLE);

        assert_eq!(
            session.input_changed("h", false, origin),
            Some(TypingSignal::Started)
        );
        assert_eq!(session.input_changed("he", false, origin + ms(400)), None);
        assert_eq!(session.input_changed("hel", false, origin + ms(900)), None);

        // Deadline moved to 1900ms with the last keystroke.
        assert_eq!(session.timer_elapsed(origin + ms(1000)), None);
        assert!(session.is_typing());
        assert_eq!(
            session.timer_elapsed(origin + ms(1900)),
            Some(TypingSignal::Stopped)
        );
        assert_eq!(session.timer_elapsed(origin + ms(2500)), None);
    }

    #[test]
    fn clearing_input_stops_immediately_and_only_once() {
        let origin = Instant::now();
        let mut session = TypingSession::default();

        session.input_changed("hello", false, origin);
        assert_eq!(
            session.input_changed("   ", false, origin + ms(10)),
            Some(TypingSignal::Stopped)
        );
        assert_eq!(session.deadline(), None);
        assert_eq!(session.input_changed("", false, origin + ms(20)), None);
    }

    #[test]
    fn disabled_input_never_starts_and_stops_an_active_session() {
        let origin = Instant::now();
        let mut session = TypingSession::default();

        assert_eq!(session.input_changed("hi", true, origin), None);
        session.input_changed("hi", false, origin);
        assert_eq!(
            session.input_changed("hi", true, origin + ms(5)),
            Some(TypingSignal::Stopped)
        );
    }

    #[test]
    fn send_and_teardown_are_idempotent() {
        let origin = Instant::now();
        let mut session = TypingSession::default();

        session.input_changed("ok", false, origin);
        assert_eq!(session.message_sent(), Some(TypingSignal::Stopped));
        assert_eq!(session.message_sent(), None);
        assert_eq!(session.teardown(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_emits_stop_after_idle_period() {
        let channel = Arc::new(LoopbackChannel::new());
        let conversation_id = ConversationId::new("c-1");
        let indicator = TypingIndicator::spawn(conversation_id.clone(), channel.clone(), IDLE);

        indicator.input_changed("h", false);
        tokio::time::sleep(ms(500)).await;
        indicator.input_changed("hi", false);
        tokio::time::sleep(ms(900)).await;
        assert_eq!(
            channel.presence_signals(),
            [PresenceSignal::Started(conversation_id.clone())]
        );

        tokio::time::sleep(ms(200)).await;
        assert_eq!(
            channel.presence_signals(),
            [
                PresenceSignal::Started(conversation_id.clone()),
                PresenceSignal::Stopped(conversation_id.clone()),
            ]
        );

        indicator.shutdown().await;
        assert_eq!(channel.presence_signals().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_typing_emits_one_final_stop_and_no_late_timer() {
        let channel = Arc::new(LoopbackChannel::new());
        let conversation_id = ConversationId::new("c-9");
        let indicator = TypingIndicator::spawn(conversation_id.clone(), channel.clone(), IDLE);

        indicator.input_changed("typing", false);
        tokio::time::sleep(ms(100)).await;
        indicator.shutdown().await;

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(
            channel.presence_signals(),
            [
                PresenceSignal::Started(conversation_id.clone()),
                PresenceSignal::Stopped(conversation_id),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_indicator_also_tears_down() {
        let channel = Arc::new(LoopbackChannel::new());
        let conversation_id = ConversationId::new("c-3");
        let indicator = TypingIndicator::spawn(conversation_id.clone(), channel.clone(), IDLE);

        indicator.input_changed("x", false);
        tokio::time::sleep(ms(10)).await;
        drop(indicator);
        tokio::time::sleep(ms(10)).await;

        assert_eq!(
            channel.presence_signals(),
            [
                PresenceSignal::Started(conversation_id.clone()),
                PresenceSignal::Stopped(conversation_id),
            ]
        );
    }
}
