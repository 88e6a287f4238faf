use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{QuotaKey, QuotaStore, StoreError, WINDOW};

// Upstash REST reply - either {"result": ...} or {"error": "..."}
#[derive(Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

// Redis counters through the Upstash REST pipeline endpoint
pub struct UpstashQuotaStore {
    client: reqwest::Client,
    pipeline_url: String,
    token: String,
}

impl UpstashQuotaStore {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            pipeline_url: format!("{}/pipeline", url.trim_end_matches('/')),
            token: token.to_string(),
        })
    }

    async fn pipeline(&self, commands: serde_json::Value) -> Result<Vec<CommandReply>, StoreError> {
        let res = self
            .client
            .post(&self.pipeline_url)
            .bearer_auth(&self.token)
            .json(&commands)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            // auth and request errors come back as a single {"error": ...}
            if let Ok(CommandReply {
                error: Some(message),
                ..
            }) = serde_json::from_str(&body)
            {
                return Err(StoreError::Backend {
                    command: "PIPELINE",
                    message,
                });
            }
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| StoreError::UnexpectedReply {
            command: "PIPELINE",
            reply: body,
        })
    }
}

fn integer_reply(command: &'static str, reply: Option<CommandReply>) -> Result<u64, StoreError> {
    let reply = reply.ok_or(StoreError::UnexpectedReply {
        command,
        reply: "missing".to_string(),
    })?;

    if let Some(message) = reply.error {
        return Err(StoreError::Backend { command, message });
    }

    match reply.result {
        Some(value) => value.as_u64().ok_or_else(|| StoreError::UnexpectedReply {
            command,
            reply: value.to_string(),
        }),
        None => Err(StoreError::UnexpectedReply {
            command,
            reply: "null".to_string(),
        }),
    }
}

#[async_trait]
impl QuotaStore for UpstashQuotaStore {
    // INCR and EXPIRE NX go out together on every call. NX never extends a
    // running TTL, and a key whose first EXPIRE was lost gets one on the next
    // call instead of living forever.
    async fn increment(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        let ttl = WINDOW.as_secs().to_string();
        let mut replies = self
            .pipeline(json!([
                ["INCR", key.as_str()],
                ["EXPIRE", key.as_str(), ttl, "NX"]
            ]))
            .await?
            .into_iter();

        let count = integer_reply("INCR", replies.next())?;
        // 1 = TTL set now, 0 = it was already running
        integer_reply("EXPIRE", replies.next())?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{FailoverQuotaStore, MemoryQuotaStore};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn store(server: &MockServer) -> UpstashQuotaStore {
        UpstashQuotaStore::new(&server.uri(), "test-token", Duration::from_secs(2)).unwrap()
    }

    // In-process stand-in for one Redis key
    #[derive(Default)]
    struct FakeRedis {
        count: u64,
        ttl_set: bool,
        expire_calls: usize,
        fail_next_expire: bool,
    }

    struct FakeRedisResponder(Arc<Mutex<FakeRedis>>);

    impl Respond for FakeRedisResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let commands: Vec<Vec<String>> = serde_json::from_slice(&request.body).unwrap();
            let mut redis = self.0.lock().unwrap();

            let replies: Vec<serde_json::Value> = commands
                .iter()
                .map(|cmd| match cmd[0].as_str() {
                    "INCR" => {
                        redis.count += 1;
                        json!({ "result": redis.count })
                    }
                    "EXPIRE" => {
                        redis.expire_calls += 1;
                        let nx = cmd.get(3).map(String::as_str) == Some("NX");
                        if redis.fail_next_expire {
                            redis.fail_next_expire = false;
                            json!({ "error": "ERR connection reset" })
                        } else if nx && redis.ttl_set {
                            json!({ "result": 0 })
                        } else {
                            redis.ttl_set = true;
                            json!({ "result": 1 })
                        }
                    }
                    other => panic!("unexpected command {other}"),
                })
                .collect();

            ResponseTemplate::new(200).set_body_json(replies)
        }
    }

    #[tokio::test]
    async fn sends_incr_and_expire_nx_in_one_pipeline() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pipeline"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!([
                ["INCR", "identity:203.0.113.5"],
                ["EXPIRE", "identity:203.0.113.5", "86400", "NX"]
            ])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "result": 1 }, { "result": 1 }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let count = store(&server)
            .increment(&QuotaKey::identity("203.0.113.5"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn running_ttl_is_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pipeline"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "result": 2 }, { "result": 0 }])),
            )
            .mount(&server)
            .await;

        let count = store(&server)
            .increment(&QuotaKey::identity("203.0.113.5"))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn lost_expire_is_repaired_on_the_next_call() {
        let server = MockServer::start().await;
        let redis = Arc::new(Mutex::new(FakeRedis {
            fail_next_expire: true,
            ..Default::default()
        }));

        Mock::given(method("POST"))
            .and(path("/pipeline"))
            .respond_with(FakeRedisResponder(redis.clone()))
            .mount(&server)
            .await;

        let memory = Arc::new(MemoryQuotaStore::new());
        let failover = FailoverQuotaStore::new(Arc::new(store(&server)), memory.clone());
        let key = QuotaKey::identity("203.0.113.5");

        // first call loses its EXPIRE and is counted in memory instead
        assert_eq!(failover.increment(&key).await.unwrap(), 1);
        assert_eq!(memory.count(&key), Some(1));
        assert!(!redis.lock().unwrap().ttl_set);

        let mut counts = Vec::new();
        for _ in 0..4 {
            counts.push(failover.increment(&key).await.unwrap());
        }
        assert_eq!(counts, vec![2, 3, 4, 5]);

        let redis = redis.lock().unwrap();
        assert!(redis.ttl_set);
        assert_eq!(redis.count, 5);
        assert_eq!(redis.expire_calls, 5);
        assert_eq!(memory.count(&key), Some(1));
    }

    #[tokio::test]
    async fn auth_error_body_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "error": "WRONGPASS invalid password" })),
            )
            .mount(&server)
            .await;

        let err = store(&server)
            .increment(&QuotaKey::identity("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { command: "PIPELINE", .. }));
    }

    #[tokio::test]
    async fn command_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "error": "WRONGTYPE Operation against a key holding the wrong kind of value" },
                { "result": 0 }
            ])))
            .mount(&server)
            .await;

        let err = store(&server)
            .increment(&QuotaKey::identity("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { command: "INCR", .. }));
    }

    #[tokio::test]
    async fn non_json_failure_is_a_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = store(&server)
            .increment(&QuotaKey::identity("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn short_or_malformed_replies_are_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "result": "OK" }])),
            )
            .mount(&server)
            .await;

        let err = store(&server)
            .increment(&QuotaKey::identity("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedReply { command: "INCR", .. }));
    }

    #[tokio::test]
    async fn missing_expire_reply_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "result": 1 }])))
            .mount(&server)
            .await;

        let err = store(&server)
            .increment(&QuotaKey::identity("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedReply { command: "EXPIRE", .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // reserve a free port, then release it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let store = UpstashQuotaStore::new(
            &format!("http://127.0.0.1:{port}"),
            "t",
            Duration::from_millis(500),
        )
        .unwrap();
        let err = store.increment(&QuotaKey::identity("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
