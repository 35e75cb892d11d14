use std::sync::Arc;

use souk::{AuthSession, ClientSettings, Credentials, SessionEvent};
use souk_booking::Role;
use souk_chat::{
    Conversation, ConversationId, KeyOutcome, KeyPress, LoopbackChannel, Message, MessageId,
    PresenceSignal, UserId,
};

fn id(raw: &str) -> ConversationId {
    ConversationId::new(raw)
}

#[tokio::test(start_paused = true)]
async fn echo_of_a_confirmed_send_is_not_shown_twice() {
    let channel = Arc::new(
        LoopbackChannel::new()
            .with_conversation(Conversation::new(id("c-1"), "Kitchen fitting"))
            .with_conversation(Conversation::new(id("c-2"), "Window cleaning"))
            .with_echo(true),
    );
    let mut auth = AuthSession::sign_in(
        Credentials::new("client-3", "Robin", Role::Client).unwrap(),
        channel.clone(),
        Arc::new(ClientSettings::default()),
    )
    .await;
    let chat = auth.chat_mut();
    chat.open_conversation(&id("c-1")).await.unwrap();

    chat.set_draft("line one").unwrap();
    assert_eq!(
        chat.key_pressed(KeyPress::modified_enter()).unwrap(),
        KeyOutcome::NewlineInserted
    );
    let continued = format!("{}line two", chat.composer().unwrap().draft());
    chat.set_draft(continued).unwrap();
    let KeyOutcome::Submitted(outgoing) = chat.key_pressed(KeyPress::enter()).unwrap() else {
        panic!("enter must submit a non-empty draft");
    };
    assert_eq!(outgoing.text, "line one\nline two");
    assert_eq!(chat.store().active().unwrap().pending_count(), 1);

    assert!(matches!(
        chat.next_event().await,
        Some(SessionEvent::Delivered { .. })
    ));
    assert!(matches!(
        chat.next_event().await,
        Some(SessionEvent::DuplicateIgnored { .. })
    ));

    let active = chat.store().active().unwrap();
    assert_eq!(active.entries.len(), 1);
    assert_eq!(active.unread_count, 0);
    assert_eq!(active.last_message.as_deref(), Some("line one line two"));

    auth.sign_out().await;
    assert_eq!(
        channel.presence_signals(),
        [
            PresenceSignal::Started(id("c-1")),
            PresenceSignal::Stopped(id("c-1")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn backend_order_is_kept_and_recency_is_a_separate_view() {
    let channel = Arc::new(
        LoopbackChannel::new()
            .with_conversation(Conversation::new(id("c-1"), "Kitchen fitting"))
            .with_conversation(Conversation::new(id("c-2"), "Window cleaning"))
            .with_conversation(Conversation::new(id("c-3"), "Kitchen tiles")),
    );
    let mut auth = AuthSession::sign_in(
        Credentials::new("client-3", "Robin", Role::Client).unwrap(),
        channel.clone(),
        Arc::new(ClientSettings::default()),
    )
    .await;

    channel.deliver(
        id("c-3"),
        Message::new(
            MessageId::new("m-1"),
            UserId::new("provider-2"),
            "Kim",
            "tiles arrive monday",
            "08:15",
        ),
    );
    let chat = auth.chat_mut();
    assert_eq!(
        chat.next_event().await,
        Some(SessionEvent::MessageAppended {
            conversation_id: id("c-3"),
            unread_count: 1,
        })
    );

    let stored = chat
        .store()
        .conversations()
        .iter()
        .map(|conversation| conversation.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(stored, ["c-1", "c-2", "c-3"]);
    assert_eq!(
        chat.store().sorted_by_recent_activity()[0].id.as_str(),
        "c-3"
    );

    let kitchen = chat
        .store()
        .filter_by_title("KITCHEN")
        .iter()
        .map(|conversation| conversation.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(kitchen, ["c-1", "c-3"]);
    assert!(chat.store().filter_by_title("plumbing").is_empty());
    assert_eq!(chat.store().filter_by_title("").len(), 3);

    auth.sign_out().await;
}
