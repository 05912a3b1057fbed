//! A real WebSocket exchange against a server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_backend_lib::{config::Settings, ws_router, AppState};
use relay_common::{ClientEvent, ServerEvent};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(Settings::default()));
    let app = ws_router::create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn open(addr: SocketAddr, user: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws?userId={user}"))
        .await
        .expect("Failed to connect");
    socket
}

async fn emit(socket: &mut Socket, event: &ClientEvent) {
    socket
        .send(Message::Text(serde_json::to_string(event).unwrap().into()))
        .await
        .unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Wait until the relay has seen `count` members in `community`
async fn wait_for_members(state: &AppState, community: &str, count: usize) {
    for _ in 0..100 {
        let users = state.relay.community_users().await.unwrap();
        if users.get(community).map_or(0, Vec::len) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{community} never reached {count} members");
}

fn join(community: &str) -> ClientEvent {
    ClientEvent::JoinCommunity {
        community_id: community.to_string(),
    }
}

#[tokio::test]
async fn test_chat_and_vote_over_websocket() {
    let (addr, state) = setup_server().await;

    let mut alice = open(addr, "alice").await;
    emit(&mut alice, &join("c1")).await;
    wait_for_members(&state, "c1", 1).await;

    let mut bob = open(addr, "bob").await;
    emit(&mut bob, &join("c1")).await;

    let ServerEvent::UserJoined(notice) = next_event(&mut alice).await else {
        panic!("Expected userJoined")
    };
    assert_eq!(notice.user_id, "bob");

    // garbage frames are dropped without closing the socket
    alice.send(Message::Text("not an event".to_string().into())).await.unwrap();

    let text = json!({"type": "text", "content": "hi bob"});
    emit(
        &mut alice,
        &ClientEvent::SendMessage {
            community_id: "c1".to_string(),
            message: text.as_object().unwrap().clone(),
        },
    )
    .await;

    let own = next_event(&mut alice).await;
    assert_eq!(own.is_sent(), Some(true));
    let peer = next_event(&mut bob).await;
    assert_eq!(peer.is_sent(), Some(false));

    emit(
        &mut alice,
        &ClientEvent::CreatePoll {
            community_id: "c1".to_string(),
            poll_id: serde_json::from_value(json!(1001)).unwrap(),
            poll_data: json!({"question": "Lunch?", "options": ["Pizza", "Sushi"]}).to_string(),
        },
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        let ServerEvent::PollUpdate(update) = next_event(socket).await else {
            panic!("Expected poll_update")
        };
        assert_eq!(update.poll_id.key(), "1001");
    }

    let vote = json!({"type": "cast_vote", "pollId": 1001, "option": 1, "voterId": "bob"});
    emit(
        &mut bob,
        &ClientEvent::SendMessage {
            community_id: "c1".to_string(),
            message: vote.as_object().unwrap().clone(),
        },
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        let ServerEvent::VoteUpdate(update) = next_event(socket).await else {
            panic!("Expected vote_update")
        };
        assert_eq!(update.votes, vec![0, 1]);
        assert_eq!(update.percentages, vec![0, 100]);
        assert_eq!(update.voter_id, "bob");
        assert_eq!(serde_json::to_value(&update.poll_id).unwrap(), json!(1001));
    }

    bob.close(None).await.unwrap();
    let ServerEvent::UserLeft(notice) = next_event(&mut alice).await else {
        panic!("Expected userLeft")
    };
    assert_eq!(notice.user_id, "bob");
}
