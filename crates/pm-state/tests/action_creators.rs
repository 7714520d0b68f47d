use async_trait::async_trait;
use pm_client::{
    ExchangeOutcome, RpcClient, RpcClientConfig, Transport, TransportError, TransportRequest,
};
use pm_core::jsonrpc::RpcErrorObject;
use pm_core::AgentDisplayState;
use pm_state::{
    Action, ActionCreators, ActionError, ActionKind, AppState, Dispatcher, LoginOutcome, Settings,
    StoreEvent, StoreId,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot};

enum Body {
    Result(Value),
    Error(i64, &'static str),
    Transport(TransportError),
}

struct Reply {
    body: Body,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    seen: Mutex<Vec<Value>>,
}

impl StubTransport {
    fn reply(&self, method: &str, body: Body) {
        self.push(method, Reply { body, gate: None });
    }

    /// Holds the reply back until the returned sender fires.
    fn gated_reply(&self, method: &str, body: Body) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.push(
            method,
            Reply {
                body,
                gate: Some(gate),
            },
        );
        release
    }

    fn push(&self, method: &str, reply: Reply) {
        self.routes
            .lock()
            .expect("routes lock")
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    fn methods(&self) -> Vec<String> {
        self.seen
            .lock()
            .expect("seen lock")
            .iter()
            .filter_map(|body| body["method"].as_str().map(str::to_string))
            .collect()
    }

    fn request_for(&self, method: &str) -> Option<Value> {
        self.seen
            .lock()
            .expect("seen lock")
            .iter()
            .find(|body| body["method"] == json!(method))
            .cloned()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value, TransportError> {
        let body: Value = serde_json::from_slice(&request.body).expect("json body");
        let id = body["id"].clone();
        let method = body["method"].as_str().unwrap_or_default().to_string();
        self.seen.lock().expect("seen lock").push(body);
        let reply = self
            .routes
            .lock()
            .expect("routes lock")
            .get_mut(&method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted reply for {method}"));
        if let Some(gate) = reply.gate {
            let _ = gate.await;
        }
        match reply.body {
            Body::Result(result) => Ok(json!({"jsonrpc": "2.0", "id": id, "result": result})),
            Body::Error(code, message) => Ok(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message}
            })),
            Body::Transport(error) => Err(error),
        }
    }
}

struct Harness {
    transport: Arc<StubTransport>,
    dispatcher: Dispatcher,
    actions: ActionCreators,
}

fn harness(state: AppState) -> Harness {
    let transport = Arc::new(StubTransport::default());
    let dispatcher = Dispatcher::new(state);
    let rpc = RpcClient::new(
        RpcClientConfig::new("http://manager.test"),
        transport.clone(),
    )
    .expect("client");
    let actions = ActionCreators::new(rpc, dispatcher.clone(), Settings::default());
    Harness {
        transport,
        dispatcher,
        actions,
    }
}

fn drain(events: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn seed_agent(dispatcher: &Dispatcher) {
    dispatcher.dispatch(Action::ReceivePlatforms {
        platforms: serde_json::from_value(json!([{"uuid": "p1", "name": "building"}]))
            .expect("platforms"),
    });
    dispatcher.dispatch(Action::ReceivePlatformAgents {
        platform_uuid: "p1".to_string(),
        agents: serde_json::from_value(json!([{"uuid": "a1", "name": "listener"}]))
            .expect("agents"),
    });
    dispatcher.dispatch(Action::ReceiveAgentStatuses {
        platform_uuid: "p1".to_string(),
        statuses: Vec::new(),
        generation: dispatcher.next_generation(),
    });
}

fn agent_state(dispatcher: &Dispatcher) -> (Option<bool>, AgentDisplayState) {
    dispatcher.read(|state| {
        let agent = state.platforms().agent("p1", "a1").expect("agent");
        (agent.action_pending, agent.display_state())
    })
}

#[tokio::test]
async fn login_success_stores_token_and_clears_error() {
    let h = harness(AppState::default());
    h.transport
        .reply("get_authorization", Body::Result(json!("tok-123")));

    let outcome = h
        .actions
        .platform_manager
        .authenticate("admin", "secret")
        .await
        .expect("login");

    assert_eq!(outcome, LoginOutcome::Authorized);
    assert_eq!(h.dispatcher.authorization().as_deref(), Some("tok-123"));
    assert!(h.dispatcher.read(|s| s.login_form().last_error().is_none()));
}

#[tokio::test]
async fn login_rejection_records_error_and_leaves_token_empty() {
    let h = harness(AppState::default());
    h.transport
        .reply("get_authorization", Body::Error(401, "bad credentials"));

    let outcome = h
        .actions
        .platform_manager
        .authenticate("admin", "wrong")
        .await
        .expect("login settles");

    let expected = RpcErrorObject::new(401, "bad credentials");
    assert_eq!(outcome, LoginOutcome::Unauthorized(expected.clone()));
    assert_eq!(h.dispatcher.authorization(), None);
    assert_eq!(
        h.dispatcher.read(|s| s.login_form().last_error().cloned()),
        Some(expected)
    );
}

#[tokio::test]
async fn login_failure_other_than_unauthorized_propagates() {
    let h = harness(AppState::default());
    h.transport.reply(
        "get_authorization",
        Body::Transport(TransportError::Request {
            message: "connection refused".to_string(),
        }),
    );

    let err = h
        .actions
        .platform_manager
        .authenticate("admin", "secret")
        .await
        .expect_err("transport failure");
    assert!(matches!(err, ActionError::Rpc(_)));
    assert!(h.dispatcher.read(|s| s.login_form().last_error().is_none()));
}

#[tokio::test]
async fn platform_with_no_agents_skips_status_call() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    h.transport.reply(
        "list_platforms",
        Body::Result(json!([{"uuid": "p1", "name": "empty"}])),
    );
    h.transport
        .reply("platforms.uuid.p1.list_agents", Body::Result(json!([])));

    h.actions
        .platform_manager
        .load_platforms()
        .await
        .expect("load");

    let agents = h.dispatcher.read(|s| {
        s.platforms()
            .platform("p1")
            .and_then(|p| p.agents)
            .map(|agents| agents.len())
    });
    assert_eq!(agents, Some(0));
    assert!(!h
        .transport
        .methods()
        .iter()
        .any(|method| method.ends_with("status_agents")));
    assert_eq!(
        h.transport
            .request_for("list_platforms")
            .map(|body| body["authorization"].clone()),
        Some(json!("tok"))
    );
}

#[tokio::test]
async fn load_platforms_fills_agents_and_statuses() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    h.transport.reply(
        "list_platforms",
        Body::Result(json!([{"uuid": "p1", "name": "building"}])),
    );
    h.transport.reply(
        "platforms.uuid.p1.list_agents",
        Body::Result(json!([
            {"uuid": "a1", "name": "listener"},
            {"uuid": "a2", "name": "historian"}
        ])),
    );
    h.transport.reply(
        "platforms.uuid.p1.status_agents",
        Body::Result(json!([
            {"uuid": "a1", "name": "listener", "process_id": 77, "return_code": null}
        ])),
    );

    h.actions
        .platform_manager
        .load_platforms()
        .await
        .expect("load");

    let states = h.dispatcher.read(|s| {
        ["a1", "a2"].map(|uuid| {
            s.platforms()
                .agent("p1", uuid)
                .map(|agent| agent.display_state().to_string())
        })
    });
    assert_eq!(
        states,
        [
            Some("Running (PID 77)".to_string()),
            Some("Never started".to_string())
        ]
    );
}

#[tokio::test]
async fn reloading_same_platforms_reports_no_platform_change() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    for _ in 0..2 {
        h.transport.reply(
            "list_platforms",
            Body::Result(json!([{"uuid": "p1", "name": "building"}])),
        );
        h.transport
            .reply("platforms.uuid.p1.list_agents", Body::Result(json!([])));
    }
    h.actions
        .platform_manager
        .load_platforms()
        .await
        .expect("first load");
    let before = h.dispatcher.read(|s| s.platforms().clone());

    let mut events = h.dispatcher.subscribe();
    h.actions
        .platform_manager
        .load_platforms()
        .await
        .expect("second load");

    let platform_changes = drain(&mut events)
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                StoreEvent::Changed {
                    store: StoreId::Platforms,
                    ..
                }
            )
        })
        .count();
    assert_eq!(platform_changes, 0);
    assert_eq!(h.dispatcher.read(|s| s.platforms().clone()), before);
}

#[tokio::test]
async fn concurrent_unauthorized_failures_deauthorize_once() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    h.transport.reply(
        "list_platforms",
        Body::Result(json!([
            {"uuid": "p1", "name": "one"},
            {"uuid": "p2", "name": "two"}
        ])),
    );
    h.transport.reply(
        "platforms.uuid.p1.list_agents",
        Body::Error(401, "Unauthorized Access"),
    );
    h.transport.reply(
        "platforms.uuid.p2.list_agents",
        Body::Error(401, "Unauthorized Access"),
    );
    let mut events = h.dispatcher.subscribe();

    let err = h
        .actions
        .platform_manager
        .load_platforms()
        .await
        .expect_err("unauthorized");

    assert!(matches!(err, ActionError::Unauthorized(_)));
    assert_eq!(h.dispatcher.authorization(), None);
    let deauthorized = drain(&mut events)
        .into_iter()
        .filter(|event| *event == StoreEvent::Deauthorized)
        .count();
    assert_eq!(deauthorized, 1);
}

#[tokio::test]
async fn start_then_stop_settles_to_newest_request() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    seed_agent(&h.dispatcher);
    assert_eq!(
        agent_state(&h.dispatcher),
        (Some(false), AgentDisplayState::NeverStarted)
    );

    let release_start = h.transport.gated_reply(
        "platforms.uuid.p1.start_agent",
        Body::Result(json!({"process_id": 10, "return_code": null})),
    );
    h.transport.reply(
        "platforms.uuid.p1.stop_agent",
        Body::Result(json!({"process_id": 10, "return_code": 0})),
    );

    let platform_manager = h.actions.platform_manager.clone();
    let start =
        tokio::spawn(async move { platform_manager.start_agent("p1", "a1").await });
    while h.transport.request_for("platforms.uuid.p1.start_agent").is_none() {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        agent_state(&h.dispatcher),
        (Some(true), AgentDisplayState::Starting)
    );

    h.actions
        .platform_manager
        .stop_agent("p1", "a1")
        .await
        .expect("stop");
    assert_eq!(agent_state(&h.dispatcher).0, Some(true));

    release_start.send(()).expect("release start");
    start.await.expect("join").expect("start");

    assert_eq!(
        agent_state(&h.dispatcher),
        (Some(false), AgentDisplayState::Stopped { return_code: 0 })
    );
    assert_eq!(
        h.transport
            .request_for("platforms.uuid.p1.stop_agent")
            .map(|body| body["params"].clone()),
        Some(json!(["a1"]))
    );
}

#[tokio::test]
async fn failed_start_clears_pending() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    seed_agent(&h.dispatcher);
    h.transport.reply(
        "platforms.uuid.p1.start_agent",
        Body::Error(500, "agent crashed"),
    );

    let err = h
        .actions
        .platform_manager
        .start_agent("p1", "a1")
        .await
        .expect_err("rpc error");

    assert!(matches!(err, ActionError::Rpc(_)));
    assert_eq!(
        agent_state(&h.dispatcher),
        (Some(false), AgentDisplayState::NeverStarted)
    );
    assert_eq!(h.dispatcher.authorization().as_deref(), Some("tok"));
}

#[tokio::test]
async fn unknown_agent_is_rejected_locally() {
    let h = harness(AppState::default());
    let err = h
        .actions
        .platform_manager
        .stop_agent("p1", "ghost")
        .await
        .expect_err("unknown agent");
    assert!(matches!(err, ActionError::UnknownAgent { .. }));
    assert!(h.transport.methods().is_empty());
}

#[tokio::test]
async fn console_request_is_logged_started_and_settled() {
    let h = harness(AppState::default());
    h.transport.reply("foo", Body::Error(-32601, "Method not found"));

    h.actions
        .console
        .send_request(json!({"method": "foo"}))
        .await
        .expect("join");

    let (count, exchange) = h.dispatcher.read(|s| {
        (
            s.console().exchange_count(),
            s.console().exchanges().next().cloned(),
        )
    });
    assert_eq!(count, 1);
    let exchange = exchange.expect("exchange");
    assert_eq!(exchange.method, "foo");
    assert!(exchange.is_settled());
    assert_eq!(
        exchange.outcome,
        ExchangeOutcome::RpcError(RpcErrorObject::new(-32601, "Method not found"))
    );
}

#[tokio::test]
async fn console_transport_failure_is_still_settled() {
    let h = harness(AppState::default());
    h.transport.reply(
        "foo",
        Body::Transport(TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }),
    );

    h.actions
        .console
        .send_request(json!({"method": "foo"}))
        .await
        .expect("join");

    let exchange = h
        .dispatcher
        .read(|s| s.console().exchanges().next().cloned())
        .expect("exchange");
    assert!(exchange.is_settled());
    assert!(matches!(exchange.outcome, ExchangeOutcome::TransportError(_)));
}

#[tokio::test]
async fn invalid_composer_is_not_sent() {
    let h = harness(AppState::default());
    h.actions.console.update_composer_value("{\"method\": ");

    let err = h.actions.console.send_composer().expect_err("invalid json");
    assert!(matches!(err, ActionError::InvalidComposer(_)));
    assert!(h.transport.methods().is_empty());
    assert_eq!(h.dispatcher.read(|s| s.console().exchange_count()), 0);
}

#[tokio::test]
async fn composer_follows_navigation_and_sends_with_token() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    h.actions
        .platform_manager
        .navigate_to_fragment("#list_platforms");
    assert_eq!(
        h.dispatcher.read(|s| s.session().fragment()),
        "#list_platforms"
    );
    h.transport.reply("list_platforms", Body::Result(json!([])));

    h.actions
        .console
        .send_composer()
        .expect("valid composer")
        .await
        .expect("join");

    let sent = h.transport.request_for("list_platforms").expect("sent");
    assert_eq!(sent["authorization"], json!("tok"));
    assert_eq!(sent["jsonrpc"], json!("2.0"));
}

#[tokio::test]
async fn logout_clears_token_without_deauthorized_event() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    let mut events = h.dispatcher.subscribe();

    h.actions.platform_manager.clear_authorization();

    assert_eq!(h.dispatcher.authorization(), None);
    assert!(!drain(&mut events).contains(&StoreEvent::Deauthorized));
}

fn platform_changes(events: Vec<StoreEvent>) -> Vec<ActionKind> {
    events
        .into_iter()
        .filter_map(|event| match event {
            StoreEvent::Changed {
                store: StoreId::Platforms,
                action,
            } => Some(action),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn platforms_render_while_agent_lists_are_in_flight() {
    let h = harness(AppState::default().with_authorization(Some("tok".to_string())));
    h.transport.reply(
        "list_platforms",
        Body::Result(json!([
            {"uuid": "p1", "name": "building"},
            {"uuid": "p2", "name": "annex"}
        ])),
    );
    let release_agents = h.transport.gated_reply(
        "platforms.uuid.p1.list_agents",
        Body::Result(json!([{"uuid": "a1", "name": "listener"}])),
    );
    h.transport
        .reply("platforms.uuid.p2.list_agents", Body::Result(json!([])));
    h.transport.reply(
        "platforms.uuid.p1.status_agents",
        Body::Result(json!([{"uuid": "a1", "process_id": 5, "return_code": null}])),
    );
    let mut events = h.dispatcher.subscribe();

    let platform_manager = h.actions.platform_manager.clone();
    let load = tokio::spawn(async move { platform_manager.load_platforms().await });
    let agent_count = |dispatcher: &Dispatcher, uuid: &str| {
        dispatcher.read(|s| {
            s.platforms()
                .platform(uuid)
                .and_then(|p| p.agents)
                .map(|agents| agents.len())
        })
    };
    while agent_count(&h.dispatcher, "p2").is_none() {
        tokio::task::yield_now().await;
    }

    assert!(h.dispatcher.read(|s| s.platforms().platform("p1").is_some()));
    assert_eq!(agent_count(&h.dispatcher, "p1"), None);
    assert_eq!(
        platform_changes(drain(&mut events)),
        vec![ActionKind::ReceivePlatforms, ActionKind::ReceivePlatformAgents]
    );

    release_agents.send(()).expect("release agents");
    load.await.expect("join").expect("load");

    assert_eq!(agent_count(&h.dispatcher, "p1"), Some(1));
    assert_eq!(
        platform_changes(drain(&mut events)),
        vec![ActionKind::ReceivePlatformAgents, ActionKind::ReceiveAgentStatuses]
    );
    assert_eq!(
        agent_state(&h.dispatcher),
        (Some(false), AgentDisplayState::Running { process_id: 5 })
    );
}
