use super::*;
use serde_json::json;
use time::macros::datetime;

fn user_json(id: i64, email: &str, is_admin: bool) -> serde_json::Value {
    json!({
        "id": id,
        "email": email,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "is_admin": is_admin,
    })
}

#[test]
fn chat_decodes_backend_payload() {
    let payload = json!({
        "id": 42,
        "user": user_json(7, "ada@example.com", false),
        "admin": user_json(1, "admin@example.com", true),
        "messages": [{
            "id": 3,
            "user": user_json(1, "admin@example.com", true),
            "text": "This is a default welcome message",
            "created_at": "2024-06-01T12:34:56.789012Z",
        }],
        "last_message_timestamp": "2024-06-01T12:34:56.789012Z",
        "unread": false,
        "unread_count": 2,
    });

    let chat: Chat = serde_json::from_value(payload).unwrap();
    assert_eq!(chat.id, 42);
    assert_eq!(chat.user.email, "ada@example.com");
    assert!(chat.admin.is_admin);
    assert_eq!(chat.messages.len(), 1);
    assert_eq!(chat.unread_count, 2);
    assert_eq!(chat.last_message_at(), Some(datetime!(2024-06-01 12:34:56.789012 UTC)));
}

#[test]
fn chat_tolerates_null_timestamp_and_missing_messages() {
    let payload = json!({
        "id": 5,
        "user": user_json(7, "ada@example.com", false),
        "admin": user_json(1, "admin@example.com", true),
        "last_message_timestamp": null,
    });

    let chat: Chat = serde_json::from_value(payload).unwrap();
    assert!(chat.messages.is_empty());
    assert!(chat.last_message_timestamp.is_none());
    assert!(chat.last_message_at().is_none());
}

#[test]
fn message_rejects_bad_timestamp() {
    let payload = json!({
        "id": 1,
        "user": user_json(7, "ada@example.com", false),
        "text": "hi",
        "created_at": "yesterday",
    });
    assert!(serde_json::from_value::<Message>(payload).is_err());
}

#[test]
fn new_message_serializes_backend_fields() {
    let msg = NewMessage {
        chat_id: 42,
        user_email: "ada@example.com".into(),
        text: "hello".into(),
        created_at: datetime!(2024-06-01 08:05:00 UTC),
    };
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["chat_id"], 42);
    assert_eq!(value["user_email"], "ada@example.com");
    assert_eq!(value["text"], "hello");
    assert_eq!(value["created_at"], "2024-06-01T08:05:00Z");
}

#[test]
fn full_name_joins_first_and_last() {
    let user: User = serde_json::from_value(user_json(7, "ada@example.com", false)).unwrap();
    assert_eq!(user.full_name(), "Ada Lovelace");
}
