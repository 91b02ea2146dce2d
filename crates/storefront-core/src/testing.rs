//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::api::{ApiError, HttpClient};
use crate::notify::{Notification, Notifier};

const TEST_SECRET: &[u8] = b"storefront-test-secret";

/// Sign `claims` as an HS256 JWT.
pub fn mint_token(claims: Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

/// Scripted response for one call.
pub enum MockReply {
    Ok(Value),
    Status(u16, Value),
    Transport,
}

impl MockReply {
    fn into_result(self) -> Result<Value, ApiError> {
        match self {
            MockReply::Ok(body) => Ok(body),
            MockReply::Status(status, body) => Err(ApiError::Status { status, body }),
            // A request that never leaves the builder yields a genuine reqwest::Error
            MockReply::Transport => Err(ApiError::Transport(
                reqwest::Client::new().get("not a url").build().unwrap_err(),
            )),
        }
    }
}

/// `HttpClient` that answers from per-path queues and records request bodies.
/// Unscripted calls get a 500.
#[derive(Default)]
pub struct MockHttp {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<(String, Value)>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, path: &str, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Make the next request wait until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self, path: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn request(
        &self,
        _method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), body.unwrap_or(Value::Null)));

        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => reply.into_result(),
            None => Err(ApiError::Status {
                status: 500,
                body: json!({"detail": "no scripted reply"}),
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Everything notified so far; clears the record.
    pub fn taken(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}
