//! Services.
//!
//! A [`Service`] is used in one of two roles at a time. As a client it sends
//! `call_service` requests, each correlated to its reply by a fresh id. As a
//! server it advertises the service and answers forwarded requests through a
//! handler.

use crate::connection::{Connection, Event};
use crate::error::ClientError;
use crate::mux::ListenerId;
use parking_lot::Mutex;
use rosbridge_protocol::message::*;
use rosbridge_protocol::Encoder;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Server-side request handler.
///
/// Receives the request arguments and fills in the response values. The
/// return value is reported to the caller as the call's success flag.
pub type ServiceHandler = dyn Fn(&Value, &mut Map<String, Value>) -> bool + Send + Sync;

/// A service handle. Clones share state.
#[derive(Clone)]
pub struct Service {
    shared: Arc<ServiceShared>,
}

struct ServiceShared {
    conn: Connection,
    name: String,
    service_type: String,
    /// Listener on the service channel while advertised.
    advertised: Mutex<Option<ListenerId>>,
}

impl Service {
    pub fn new(conn: &Connection, name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(ServiceShared {
                conn: conn.clone(),
                name: name.into(),
                service_type: service_type.into(),
                advertised: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn service_type(&self) -> &str {
        &self.shared.service_type
    }

    pub fn is_advertised(&self) -> bool {
        self.shared.advertised.lock().is_some()
    }

    /// Sends a request.
    ///
    /// Returns `None` without sending anything while this handle advertises
    /// the service. The reply listener is registered before the request is
    /// queued, so a reply can never arrive unobserved.
    pub fn call(&self, request: Value) -> Option<PendingCall> {
        if self.is_advertised() {
            tracing::debug!("Not calling {}: advertised by this client", self.shared.name);
            return None;
        }

        let shared = &self.shared;
        let id = shared.conn.operation_id("call_service", &shared.name);
        let message = Message::CallService(CallService {
            id: Some(id.clone()),
            service: shared.name.clone(),
            service_type: Some(shared.service_type.clone()),
            args: request,
        });
        let text = match Encoder::encode(&message) {
            Ok(text) => text,
            Err(e) => return Some(PendingCall::ready(id, Err(e.into()))),
        };

        let (tx, rx) = oneshot::channel();
        let reply = Mutex::new(Some(tx));
        shared.conn.once(id.clone(), move |event| {
            let Event::ServiceResponse(response) = event else {
                return;
            };
            let outcome = if response.is_failure() {
                Err(ClientError::ServiceFailed(response.values.clone()))
            } else {
                Ok(response.values.clone())
            };
            if let Some(tx) = reply.lock().take() {
                let _ = tx.send(outcome);
            }
        });

        tracing::debug!("Calling {} ({})", shared.name, id);
        shared.conn.send_encoded(text);
        Some(PendingCall { id, rx })
    }

    /// Calls the service and waits for the reply.
    pub async fn request(&self, request: Value) -> Result<Value, ClientError> {
        match self.call(request) {
            Some(pending) => pending.await,
            None => Err(ClientError::ServiceAdvertised(self.shared.name.clone())),
        }
    }

    /// Calls the service and deserializes the reply values into `T`.
    pub async fn request_as<T: DeserializeOwned>(&self, request: Value) -> Result<T, ClientError> {
        let values = self.request(request).await?;
        Ok(serde_json::from_value(values)?)
    }

    /// Advertises the service, answering each request with `handler`.
    ///
    /// A no-op when already advertised.
    pub fn advertise<F>(&self, handler: F)
    where
        F: Fn(&Value, &mut Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        let shared = &self.shared;
        {
            let mut advertised = shared.advertised.lock();
            if advertised.is_some() {
                return;
            }

            let handler: Arc<ServiceHandler> = Arc::new(handler);
            let weak = Arc::downgrade(shared);
            *advertised = Some(shared.conn.on(shared.name.clone(), move |event| {
                if let (Event::CallService(request), Some(shared)) = (event, weak.upgrade()) {
                    shared.respond(handler.as_ref(), request);
                }
            }));
        }

        tracing::debug!("Advertising service {}", shared.name);
        shared.send(&Message::AdvertiseService(AdvertiseService {
            service_type: shared.service_type.clone(),
            service: shared.name.clone(),
        }));
    }

    /// Stops serving. A no-op when not advertised.
    pub fn unadvertise(&self) {
        let shared = &self.shared;
        let Some(listener) = shared.advertised.lock().take() else {
            return;
        };
        shared.conn.off(&shared.name, listener);

        tracing::debug!("Unadvertising service {}", shared.name);
        shared.send(&Message::UnadvertiseService(UnadvertiseService {
            service: shared.name.clone(),
        }));
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.shared.name)
            .field("service_type", &self.shared.service_type)
            .field("advertised", &self.is_advertised())
            .finish()
    }
}

impl ServiceShared {
    fn send(&self, message: &Message) {
        if let Err(e) = self.conn.send(message) {
            tracing::error!("Failed to send {} for {}: {}", message.op(), self.name, e);
        }
    }

    fn respond(&self, handler: &ServiceHandler, request: &CallService) {
        let mut values = Map::new();
        let success = handler(&request.args, &mut values);
        if !success {
            tracing::debug!("Handler for {} rejected request {:?}", self.name, request.id);
        }
        self.send(&Message::ServiceResponse(ServiceResponse {
            id: request.id.clone(),
            service: self.name.clone(),
            values: Value::Object(values),
            result: Some(success),
        }));
    }
}

/// A service call awaiting its reply.
///
/// Resolves to the response values, to [`ClientError::ServiceFailed`] when
/// the server reports failure, or to [`ClientError::ConnectionClosed`] when
/// the connection is dropped first.
#[derive(Debug)]
pub struct PendingCall {
    id: String,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
}

impl PendingCall {
    fn ready(id: String, outcome: Result<Value, ClientError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { id, rx }
    }

    /// The operation id correlating this call with its reply.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::ConnectionClosed)))
    }
}

impl Connection {
    /// Creates a service handle on this connection.
    pub fn service(&self, name: impl Into<String>, service_type: impl Into<String>) -> Service {
        Service::new(self, name, service_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBridge;
    use rosbridge_protocol::Frame;
    use serde::Deserialize;
    use serde_json::json;

    fn setup() -> (MockBridge, Connection) {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        bridge.open();
        (bridge, conn)
    }

    fn reply(id: &Value, values: Value, result: bool) -> Value {
        json!({
            "op": "service_response", "id": id, "service": "/add_two_ints",
            "values": values, "result": result
        })
    }

    #[tokio::test]
    async fn test_call_message_and_reply() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");

        let pending = service.call(json!({"a": 1, "b": 2})).unwrap();
        let sent = &bridge.sent_ops("call_service")[0];
        assert_eq!(sent["id"], json!(pending.id()));
        assert_eq!(sent["service"], "/add_two_ints");
        assert_eq!(sent["type"], "rospy_tutorials/AddTwoInts");
        assert_eq!(sent["args"], json!({"a": 1, "b": 2}));

        bridge.receive(reply(&sent["id"], json!({"sum": 3}), true));
        assert_eq!(pending.await.unwrap(), json!({"sum": 3}));
        assert_eq!(conn.listener_count(sent["id"].as_str().unwrap()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_correlated() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");

        let first = service.call(json!({"a": 1, "b": 1})).unwrap();
        let second = service.call(json!({"a": 2, "b": 2})).unwrap();
        assert_ne!(first.id(), second.id());

        let sent = bridge.sent_ops("call_service");
        // Replies arrive in reverse order.
        bridge.receive(reply(&sent[1]["id"], json!({"sum": 4}), true));
        bridge.receive(reply(&sent[0]["id"], json!({"sum": 2}), true));

        assert_eq!(first.await.unwrap(), json!({"sum": 2}));
        assert_eq!(second.await.unwrap(), json!({"sum": 4}));
    }

    #[tokio::test]
    async fn test_failed_call() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");
        let pending = service.call(json!({})).unwrap();

        let id = json!(pending.id());
        bridge.receive(reply(&id, json!("missing argument 'a'"), false));
        let err = pending.await.unwrap_err();
        assert!(matches!(err, ClientError::ServiceFailed(_)));
        assert_eq!(err.remote_values(), Some(&json!("missing argument 'a'")));
    }

    #[tokio::test]
    async fn test_reply_without_result_is_success() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");
        let pending = service.call(json!({})).unwrap();

        bridge.receive(json!({
            "op": "service_response", "id": pending.id(),
            "service": "/add_two_ints", "values": {"sum": 0}
        }));
        assert_eq!(pending.await.unwrap(), json!({"sum": 0}));
    }

    #[tokio::test]
    async fn test_call_dropped_with_connection() {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        let service = conn.service("/slow", "std_srvs/Trigger");
        let pending = service.call(json!({})).unwrap();

        drop(service);
        drop(conn);
        assert!(matches!(pending.await, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_call_before_open_is_deferred() {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        bridge.respond_with(|msg| {
            if msg["op"] == "call_service" {
                vec![Frame::text(
                    json!({
                        "op": "service_response", "id": msg["id"], "service": msg["service"],
                        "values": {"success": true, "message": "ok"}, "result": true
                    })
                    .to_string(),
                )]
            } else {
                Vec::new()
            }
        });

        #[derive(Deserialize)]
        struct TriggerResponse {
            success: bool,
            message: String,
        }

        let service = conn.service("/trigger", "std_srvs/Trigger");
        let pending = service.call(json!({})).unwrap();
        assert!(bridge.sent().is_empty());

        bridge.open();
        let values = pending.await.unwrap();
        let response: TriggerResponse = serde_json::from_value(values).unwrap();
        assert!(response.success);
        assert_eq!(response.message, "ok");

        let typed: TriggerResponse = service.request_as(json!({})).await.unwrap();
        assert!(typed.success);
    }

    #[tokio::test]
    async fn test_advertised_service_cannot_be_called() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");
        service.advertise(|_, _| true);

        assert!(service.call(json!({})).is_none());
        assert!(bridge.sent_ops("call_service").is_empty());
        assert!(matches!(
            service.request(json!({})).await,
            Err(ClientError::ServiceAdvertised(_))
        ));
    }

    #[test]
    fn test_advertise_and_answer() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");
        service.advertise(|request, response| {
            let (Some(a), Some(b)) = (request["a"].as_i64(), request["b"].as_i64()) else {
                response.insert("error".into(), json!("a and b are required"));
                return false;
            };
            response.insert("sum".into(), json!(a + b));
            true
        });

        let advertise = &bridge.sent_ops("advertise_service")[0];
        assert_eq!(advertise["service"], "/add_two_ints");
        assert_eq!(advertise["type"], "rospy_tutorials/AddTwoInts");

        bridge.receive(json!({
            "op": "call_service", "id": "srv:1", "service": "/add_two_ints",
            "args": {"a": 20, "b": 22}
        }));
        bridge.receive(json!({
            "op": "call_service", "id": "srv:2", "service": "/add_two_ints", "args": {}
        }));

        let responses = bridge.sent_ops("service_response");
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0],
            json!({
                "op": "service_response", "id": "srv:1", "service": "/add_two_ints",
                "values": {"sum": 42}, "result": true
            })
        );
        assert_eq!(responses[1]["id"], "srv:2");
        assert_eq!(responses[1]["result"], false);
        assert_eq!(responses[1]["values"]["error"], "a and b are required");
    }

    #[test]
    fn test_advertise_and_unadvertise_idempotent() {
        let (bridge, conn) = setup();
        let service = conn.service("/add_two_ints", "rospy_tutorials/AddTwoInts");

        service.unadvertise();
        assert!(bridge.sent_ops("unadvertise_service").is_empty());

        service.advertise(|_, _| true);
        service.advertise(|_, _| false);
        assert_eq!(bridge.sent_ops("advertise_service").len(), 1);

        service.unadvertise();
        service.unadvertise();
        assert_eq!(bridge.sent_ops("unadvertise_service").len(), 1);
        assert!(!service.is_advertised());
        assert_eq!(conn.listener_count("/add_two_ints"), 0);

        // Requests are no longer answered.
        bridge.receive(json!({
            "op": "call_service", "id": "srv:9", "service": "/add_two_ints", "args": {}
        }));
        assert!(bridge.sent_ops("service_response").is_empty());

        // And the handle can call again.
        assert!(service.call(json!({})).is_some());
    }
}
