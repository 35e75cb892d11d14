use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, Snafu};
use souk::{
    AuthError, AuthSession, ChatSession, ClientSettings, Credentials, LocalUser, SessionError,
    SessionEvent, SettingsStore,
};
use souk_booking::{Booking, BookingError, BookingRecord, Role};
use souk_chat::{
    ChannelError, Conversation, ConversationId, KeyOutcome, KeyPress, LoopbackChannel, Message,
    MessageId, PresenceSignal, UserId,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    TypingBurst,
    SubmitTrimmed,
    UnreadAccounting,
    SendFailureRestore,
    BookingActions,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "typing_burst" => Some(Self::TypingBurst),
            "submit_trimmed" => Some(Self::SubmitTrimmed),
            "unread_accounting" => Some(Self::UnreadAccounting),
            "send_failure_restore" => Some(Self::SendFailureRestore),
            "booking_actions" => Some(Self::BookingActions),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::TypingBurst => "typing_burst",
            Self::SubmitTrimmed => "submit_trimmed",
            Self::UnreadAccounting => "unread_accounting",
            Self::SendFailureRestore => "send_failure_restore",
            Self::BookingActions => "booking_actions",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("chat session failed: {source}"))]
    Session {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("sign-in failed: {source}"))]
    Auth {
        stage: &'static str,
        source: AuthError,
    },
    #[snafu(display("booking fixture rejected: {source}"))]
    BookingFixture {
        stage: &'static str,
        source: BookingError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    let settings = match args.settings_path.as_ref() {
        Some(path) => {
            println!("settings_path={}", path.display());
            SettingsStore::new(path.clone()).settings()
        }
        None => Arc::new(ClientSettings::default()),
    };
    println!("typing_idle_ms={}", settings.typing_idle_ms);

    match args.scenario {
        Scenario::TypingBurst => run_typing_burst(settings).await,
        Scenario::SubmitTrimmed => run_submit_trimmed(settings).await,
        Scenario::UnreadAccounting => run_unread_accounting(settings).await,
        Scenario::SendFailureRestore => run_send_failure_restore(settings).await,
        Scenario::BookingActions => run_booking_actions(settings).await,
        Scenario::All => run_all(settings).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut settings_path = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--settings" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-settings-value",
                    arg: "--settings",
                })?;
                settings_path = Some(PathBuf::from(value));
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        settings_path,
    })
}

fn fixture_channel() -> Arc<LoopbackChannel> {
    Arc::new(
        LoopbackChannel::new()
            .with_conversation(Conversation::new(ConversationId::new("c-1"), "Roof repair"))
            .with_conversation(Conversation::new(
                ConversationId::new("c-2"),
                "Garden design",
            )),
    )
}

fn local_user() -> LocalUser {
    LocalUser {
        id: UserId::new("client-1"),
        display_name: "Sam".to_string(),
    }
}

async fn open_session(
    channel: &Arc<LoopbackChannel>,
    settings: Arc<ClientSettings>,
    conversation: &str,
    stage: &'static str,
) -> RunnerResult<ChatSession> {
    let mut session = ChatSession::new(channel.clone(), local_user(), settings);
    session.load().await;
    session
        .open_conversation(&ConversationId::new(conversation))
        .await
        .context(SessionSnafu { stage })?;
    Ok(session)
}

fn check(scenario: &'static str, stage: &'static str, ok: bool, reason: &str) -> RunnerResult<()> {
    if ok {
        return Ok(());
    }
    ScenarioFailedSnafu {
        stage,
        scenario,
        reason: reason.to_string(),
    }
    .fail()
}

async fn run_typing_burst(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    let idle = settings.typing_idle();
    let channel = fixture_channel();
    let mut session = open_session(&channel, settings, "c-1", "scenario-typing-open").await?;

    let mut draft = String::new();
    for character in "on my way".chars() {
        draft.push(character);
        session
            .set_draft(draft.clone())
            .context(SessionSnafu {
                stage: "scenario-typing-keystroke",
            })?;
        tokio::time::sleep(idle / 10).await;
    }
    tokio::time::sleep(idle + idle / 2).await;

    let signals = channel.presence_signals();
    let starts = signals
        .iter()
        .filter(|signal| matches!(signal, PresenceSignal::Started(_)))
        .count();
    let stops = signals.len() - starts;
    println!("typing_starts={starts}");
    println!("typing_stops={stops}");
    check(
        "typing_burst",
        "scenario-typing-assert",
        starts == 1 && stops == 1,
        "expected exactly one start and one stop for a single burst",
    )?;

    session.teardown().await;
    check(
        "typing_burst",
        "scenario-typing-teardown",
        channel.presence_signals().len() == 2,
        "teardown after idle must not emit another stop",
    )?;

    println!("runner_ok=true");
    Ok(())
}

async fn run_submit_trimmed(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    let channel = fixture_channel();
    let mut session = open_session(&channel, settings, "c-1", "scenario-submit-open").await?;

    session.set_draft("  hello  ").context(SessionSnafu {
        stage: "scenario-submit-draft",
    })?;
    let outcome = session
        .key_pressed(KeyPress::enter())
        .context(SessionSnafu {
            stage: "scenario-submit-enter",
        })?;
    let draft_cleared = session
        .composer()
        .is_some_and(|composer| composer.draft().is_empty());
    let handed_over = channel.sent_requests().len() == 1;
    println!("submitted={}", matches!(outcome, KeyOutcome::Submitted(_)));
    println!("draft_cleared={draft_cleared}");
    println!("handed_over={handed_over}");

    let delivered = matches!(
        session.next_event().await,
        Some(SessionEvent::Delivered { .. })
    );
    let sent_text = channel
        .sent_requests()
        .first()
        .map(|request| request.text.clone())
        .unwrap_or_default();
    println!("delivered={delivered}");
    println!("sent_text={sent_text}");

    check(
        "submit_trimmed",
        "scenario-submit-assert",
        draft_cleared && handed_over && delivered && sent_text == "hello",
        "expected the trimmed text to be sent on submit and the draft cleared",
    )?;

    session.teardown().await;
    println!("runner_ok=true");
    Ok(())
}

async fn run_unread_accounting(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    let channel = fixture_channel();
    let mut session = open_session(&channel, settings, "c-1", "scenario-unread-open").await?;

    for (index, conversation) in ["c-1", "c-2", "c-2", "c-1", "c-2"].iter().enumerate() {
        channel.deliver(
            ConversationId::new(*conversation),
            Message::new(
                MessageId::new(format!("m-{index}")),
                UserId::new("provider-1"),
                "Alex",
                "quote attached",
                "12:00",
            ),
        );
        session.next_event().await;
    }

    let active_unread = session
        .store()
        .get(&ConversationId::new("c-1"))
        .map_or(u32::MAX, |conversation| conversation.unread_count);
    let other_unread = session
        .store()
        .get(&ConversationId::new("c-2"))
        .map_or(0, |conversation| conversation.unread_count);
    println!("active_unread={active_unread}");
    println!("other_unread={other_unread}");

    let selected = session
        .open_conversation(&ConversationId::new("c-2"))
        .await
        .context(SessionSnafu {
            stage: "scenario-unread-select",
        })?;
    println!("cleared_unread={}", selected.cleared_unread);
    println!("total_unread={}", session.store().total_unread());

    check(
        "unread_accounting",
        "scenario-unread-assert",
        active_unread == 0
            && other_unread == 3
            && selected.cleared_unread == 3
            && session.store().total_unread() == 0,
        "unread counts must only grow off-screen and reset on selection",
    )?;

    session.teardown().await;
    println!("runner_ok=true");
    Ok(())
}

async fn run_send_failure_restore(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    let channel = fixture_channel();
    let mut session = open_session(&channel, settings, "c-1", "scenario-failure-open").await?;

    channel.fail_next_send(ChannelError::Transport {
        stage: "qa-runner",
        details: "connection reset".to_string(),
    });
    session.set_draft("can you do tuesday?").context(SessionSnafu {
        stage: "scenario-failure-draft",
    })?;
    let client_id = session
        .submit()
        .context(SessionSnafu {
            stage: "scenario-failure-submit",
        })?
        .context(ScenarioFailedSnafu {
            stage: "scenario-failure-submit",
            scenario: "send_failure_restore",
            reason: "submit produced nothing".to_string(),
        })?;

    let restored = matches!(
        session.next_event().await,
        Some(SessionEvent::SendFailed {
            draft_restored: true,
            ..
        })
    );
    let notified = session.notifications().drain().len();
    println!("draft_restored={restored}");
    println!("notifications={notified}");

    session
        .retry(&ConversationId::new("c-1"), client_id)
        .context(SessionSnafu {
            stage: "scenario-failure-retry",
        })?;
    let retried = matches!(
        session.next_event().await,
        Some(SessionEvent::Delivered { .. })
    );
    println!("retry_delivered={retried}");

    check(
        "send_failure_restore",
        "scenario-failure-assert",
        restored && notified == 1 && retried,
        "a failed send must restore the draft, notify once, and be retryable",
    )?;

    session.teardown().await;
    println!("runner_ok=true");
    Ok(())
}

async fn run_booking_actions(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    let fixtures = [
        ("b-1", "pending", "unpaid"),
        ("b-2", "accepted", "unpaid"),
        ("b-3", "accepted", "deposit_paid"),
        ("b-4", "completed", "deposit_paid"),
        ("b-5", "completed", "paid"),
        ("b-6", "cancelled", "deposit_paid"),
    ];
    let channel = fixture_channel();

    for role in [Role::Client, Role::Provider, Role::Admin] {
        let credentials = Credentials::new(&format!("{role}-1"), role.as_str(), role).context(
            AuthSnafu {
                stage: "scenario-booking-credentials",
            },
        )?;
        let session = AuthSession::sign_in(credentials, channel.clone(), settings.clone()).await;

        for (id, status, payment) in fixtures {
            let booking = Booking::try_from(BookingRecord {
                id: id.to_string(),
                status: status.to_string(),
                payment_status: payment.to_string(),
                service_title: "Fixture".to_string(),
                total_amount_cents: 10_000,
                deposit_amount_cents: 2_500,
            })
            .context(BookingFixtureSnafu {
                stage: "scenario-booking-parse",
            })?;

            let labels = session
                .booking_actions(&booking)
                .iter()
                .map(|action| action.label())
                .collect::<Vec<_>>()
                .join("|");
            println!("{role}.{id}={labels}");
        }
        session.sign_out().await;
    }

    let invalid = BookingRecord {
        id: "b-x".to_string(),
        status: "pending".to_string(),
        payment_status: "paid".to_string(),
        service_title: "Fixture".to_string(),
        total_amount_cents: 10_000,
        deposit_amount_cents: 2_500,
    };
    let rejected = matches!(
        Booking::try_from(invalid),
        Err(BookingError::InvalidCombination { .. })
    );
    println!("invalid_combination_rejected={rejected}");
    check(
        "booking_actions",
        "scenario-booking-assert",
        rejected,
        "a pending booking cannot already be paid",
    )?;

    println!("runner_ok=true");
    Ok(())
}

async fn run_all(settings: Arc<ClientSettings>) -> RunnerResult<()> {
    run_typing_burst(settings.clone()).await?;
    run_submit_trimmed(settings.clone()).await?;
    run_unread_accounting(settings.clone()).await?;
    run_send_failure_restore(settings.clone()).await?;
    run_booking_actions(settings).await?;

    println!("all_passed=true");
    Ok(())
}
