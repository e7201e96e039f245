/// Benchmarks for inbound frame decoding.
///
/// Every frame received by a connection goes through `parse_events`, and typed consumers then
/// deserialize the payload again, so both steps are measured.
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use realtime_client::dm::DmEvent;
use realtime_client::notifications::Alert;
use realtime_client::ws::parse_events;

fn bench_parse_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("ws/parse_events");

    let typing = br#"{"type":"typing_status","conversation_id":3,"user_id":2,"is_typing":true}"#;
    group.throughput(Throughput::Bytes(typing.len() as u64));
    group.bench_function("single_object", |b| {
        b.iter(|| {
            parse_events(std::hint::black_box(typing)).expect("Parsing should succeed");
        });
    });

    let batch = br#"[
        {"type":"notification","notification":{"id":1,"type":"like","title":"New like","message":"alice liked your run"}},
        {"type":"level_up","new_level":12},
        {"type":"achievement_unlocked","achievement_name":"Marathoner"},
        {"type":"heartbeat"}
    ]"#;
    group.throughput(Throughput::Bytes(batch.len() as u64));
    group.bench_function("array_of_four", |b| {
        b.iter(|| {
            parse_events(std::hint::black_box(batch)).expect("Parsing should succeed");
        });
    });

    let untyped = br#"{"status":"ok","conversation_id":3}"#;
    group.throughput(Throughput::Bytes(untyped.len() as u64));
    group.bench_function("untyped_object", |b| {
        b.iter(|| {
            parse_events(std::hint::black_box(untyped)).expect("Parsing should succeed");
        });
    });

    group.finish();
}

fn bench_typed_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("ws/typed_events");

    let new_message = br#"{
        "type": "new_message",
        "message": {
            "id": 10,
            "conversation": 3,
            "sender": {"id": 2, "username": "alice", "profile_picture_url": null},
            "content": "see you at the track",
            "message_type": "text",
            "is_read": false,
            "reactions": [{"id": 1, "user": {"id": 7, "username": "bob"}, "emoji": "🔥"}],
            "created_at": "2024-05-01T09:30:00Z"
        }
    }"#;
    let events = parse_events(new_message).expect("Parsing should succeed");
    group.bench_function("DmEvent::NewMessage", |b| {
        b.iter(|| {
            DmEvent::from_event(std::hint::black_box(&events[0]))
                .expect("Deserialization should succeed");
        });
    });

    let notification = br#"{
        "type": "notification",
        "notification": {
            "id": 1,
            "type": "follow",
            "title": "New follower",
            "message": "alice followed you",
            "from_user": {"id": 2, "username": "alice"},
            "created_at": "2024-05-01T09:30:00Z",
            "is_read": false
        }
    }"#;
    let events = parse_events(notification).expect("Parsing should succeed");
    group.bench_function("Alert::Notification", |b| {
        b.iter(|| {
            Alert::from_event(std::hint::black_box(&events[0])).expect("Alert should be derived");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse_events, bench_typed_events);
criterion_main!(benches);
