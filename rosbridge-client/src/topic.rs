//! Topics.
//!
//! A [`Topic`] is a named, typed publish/subscribe channel on a connection.
//! Subscribing the first local listener sends one wire `subscribe`; further
//! listeners share it. Publishing advertises on demand. With
//! `reconnect_on_close` the last subscribe/advertise is resent exactly once
//! per disconnection, however many close events arrive before the next open.

use crate::config::TopicDefaults;
use crate::connection::{Connection, Event, CLOSE, CONNECTION};
use crate::error::ClientError;
use crate::mux::{ChannelMultiplexer, ListenerId};
use parking_lot::Mutex;
use rosbridge_protocol::message::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Local channel carrying inbound messages.
pub const MESSAGE: &str = "message";
/// Local channel notified when the wire subscription is dropped.
pub const UNSUBSCRIBE: &str = "unsubscribe";
/// Local channel notified when the advertisement is withdrawn.
pub const UNADVERTISE: &str = "unadvertise";

/// Topic options.
#[derive(Debug, Clone)]
pub struct TopicOptions {
    pub name: String,
    pub message_type: String,
    pub compression: Compression,
    /// Milliseconds; negative values are clamped to 0.
    pub throttle_rate: i64,
    pub queue_size: u64,
    pub queue_length: u64,
    pub latch: bool,
    pub reconnect_on_close: bool,
}

impl TopicOptions {
    pub fn new(name: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self::from_defaults(name, message_type, &TopicDefaults::default())
    }

    pub fn from_defaults(
        name: impl Into<String>,
        message_type: impl Into<String>,
        defaults: &TopicDefaults,
    ) -> Self {
        Self {
            name: name.into(),
            message_type: message_type.into(),
            compression: defaults.compression,
            throttle_rate: defaults.throttle_rate,
            queue_size: defaults.queue_size,
            queue_length: defaults.queue_length,
            latch: defaults.latch,
            reconnect_on_close: defaults.reconnect_on_close,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_throttle_rate(mut self, throttle_rate: i64) -> Self {
        self.throttle_rate = throttle_rate;
        self
    }

    pub fn with_queue_size(mut self, queue_size: u64) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_queue_length(mut self, queue_length: u64) -> Self {
        self.queue_length = queue_length;
        self
    }

    pub fn with_latch(mut self, latch: bool) -> Self {
        self.latch = latch;
        self
    }

    pub fn with_reconnect_on_close(mut self, reconnect_on_close: bool) -> Self {
        self.reconnect_on_close = reconnect_on_close;
        self
    }
}

/// A topic handle. Clones share state.
#[derive(Clone)]
pub struct Topic {
    shared: Arc<TopicShared>,
}

struct TopicShared {
    conn: Connection,
    options: TopicOptions,
    events: ChannelMultiplexer<Event>,
    state: Mutex<TopicState>,
}

#[derive(Default)]
struct TopicState {
    subscription: Option<WireSubscription>,
    advertisement: Option<WireAdvertisement>,
}

struct WireSubscription {
    id: String,
    /// Listener on the connection forwarding publishes to local listeners.
    forward: ListenerId,
    resend: Option<PendingResubscription>,
}

struct WireAdvertisement {
    id: String,
    resend: Option<PendingResubscription>,
    /// Clears the advertisement on close when not reconnecting.
    close_guard: Option<ListenerId>,
}

/// A wire message to resend after the connection closes.
struct PendingResubscription {
    message: Message,
    /// Set once a resend is queued; cleared by the next `connection` event.
    waiting_for_reconnect: bool,
    close_listener: ListenerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Subscription,
    Advertisement,
}

impl TopicState {
    fn resend_slot(&mut self, role: Role) -> Option<&mut Option<PendingResubscription>> {
        match role {
            Role::Subscription => self.subscription.as_mut().map(|s| &mut s.resend),
            Role::Advertisement => self.advertisement.as_mut().map(|a| &mut a.resend),
        }
    }
}

impl Topic {
    /// Creates a topic. Name and message type are required.
    pub fn new(conn: &Connection, mut options: TopicOptions) -> Result<Self, ClientError> {
        if options.name.is_empty() {
            return Err(ClientError::MissingField("name"));
        }
        if options.message_type.is_empty() {
            return Err(ClientError::MissingField("message_type"));
        }
        options.throttle_rate = options.throttle_rate.max(0);

        Ok(Self {
            shared: Arc::new(TopicShared {
                conn: conn.clone(),
                options,
                events: ChannelMultiplexer::new(),
                state: Mutex::new(TopicState::default()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    pub fn message_type(&self) -> &str {
        &self.shared.options.message_type
    }

    pub fn options(&self) -> &TopicOptions {
        &self.shared.options
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.state.lock().subscription.is_some()
    }

    pub fn is_advertised(&self) -> bool {
        self.shared.state.lock().advertisement.is_some()
    }

    /// Id of the current wire subscription.
    pub fn subscribe_id(&self) -> Option<String> {
        self.shared.state.lock().subscription.as_ref().map(|s| s.id.clone())
    }

    /// Id of the current advertisement.
    pub fn advertise_id(&self) -> Option<String> {
        self.shared.state.lock().advertisement.as_ref().map(|a| a.id.clone())
    }

    /// Registers `callback` for inbound messages, subscribing on the wire if
    /// this is the first subscription.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let listener = self.shared.events.on(MESSAGE, move |event| {
            if let Event::Publish(msg) = event {
                callback(msg);
            }
        });
        self.shared.ensure_subscribed();
        listener
    }

    /// Like [`subscribe`](Self::subscribe), deserializing each message into `T`.
    ///
    /// Messages that do not deserialize are logged and skipped.
    pub fn subscribe_as<T, F>(&self, callback: F) -> ListenerId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let topic = self.name().to_string();
        self.subscribe(move |msg| match serde_json::from_value::<T>(msg.clone()) {
            Ok(typed) => callback(typed),
            Err(e) => tracing::warn!("Skipping message on {}: {}", topic, e),
        })
    }

    /// Subscribes and returns a stream of inbound messages.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |msg| {
            let _ = tx.send(msg.clone());
        });
        (id, rx)
    }

    /// Removes a subscription.
    ///
    /// With `Some(listener)`, only that listener goes away and the wire
    /// subscription is dropped when it was the last one. With `None`, every
    /// local listener is removed and the wire subscription is dropped.
    pub fn unsubscribe(&self, listener: Option<ListenerId>) {
        let shared = &self.shared;
        match listener {
            Some(id) => {
                shared.events.off(MESSAGE, id);
            }
            None => shared.events.remove_all(MESSAGE),
        }

        let subscription = {
            let mut state = shared.state.lock();
            if state.subscription.is_none() || shared.events.listener_count(MESSAGE) > 0 {
                return;
            }
            match state.subscription.take() {
                Some(subscription) => subscription,
                None => return,
            }
        };

        shared.conn.off(&shared.options.name, subscription.forward);
        if let Some(resend) = subscription.resend {
            shared.conn.off(CLOSE, resend.close_listener);
        }
        shared.events.emit(UNSUBSCRIBE, &Event::Unsubscribe);

        tracing::debug!("Unsubscribing {} ({})", shared.options.name, subscription.id);
        shared.send(&Message::Unsubscribe(Unsubscribe {
            id: subscription.id,
            topic: shared.options.name.clone(),
        }));
    }

    /// Advertises the topic. A no-op when already advertised.
    pub fn advertise(&self) {
        let shared = &self.shared;
        let message = {
            let mut state = shared.state.lock();
            if state.advertisement.is_some() {
                return;
            }

            let id = shared.conn.operation_id("advertise", &shared.options.name);
            let close_guard = if shared.options.reconnect_on_close {
                None
            } else {
                let weak = Arc::downgrade(shared);
                Some(shared.conn.on(CLOSE, move |_| {
                    if let Some(shared) = weak.upgrade() {
                        shared.forget_advertisement();
                    }
                }))
            };

            state.advertisement = Some(WireAdvertisement {
                id: id.clone(),
                resend: None,
                close_guard,
            });
            Message::Advertise(Advertise {
                id,
                msg_type: shared.options.message_type.clone(),
                topic: shared.options.name.clone(),
                latch: shared.options.latch,
                queue_size: shared.options.queue_size,
            })
        };

        tracing::debug!("Advertising {}", shared.options.name);
        shared.send_tracked(Role::Advertisement, message);
    }

    /// Withdraws the advertisement. A no-op when not advertised.
    pub fn unadvertise(&self) {
        let shared = &self.shared;
        let advertisement = match shared.state.lock().advertisement.take() {
            Some(advertisement) => advertisement,
            None => return,
        };

        if let Some(resend) = advertisement.resend {
            shared.conn.off(CLOSE, resend.close_listener);
        }
        if let Some(guard) = advertisement.close_guard {
            shared.conn.off(CLOSE, guard);
        }
        shared.events.emit(UNADVERTISE, &Event::Unadvertise);

        tracing::debug!("Unadvertising {} ({})", shared.options.name, advertisement.id);
        shared.send(&Message::Unadvertise(Unadvertise {
            id: advertisement.id,
            topic: shared.options.name.clone(),
        }));
    }

    /// Publishes `msg`, advertising first if needed.
    pub fn publish(&self, msg: Value) {
        if !self.is_advertised() {
            self.advertise();
        }
        let shared = &self.shared;
        let id = shared.conn.operation_id("publish", &shared.options.name);
        shared.send(&Message::Publish(Publish {
            id: Some(id),
            topic: shared.options.name.clone(),
            msg,
            latch: shared.options.latch,
        }));
    }

    /// Serializes `msg` and publishes it.
    pub fn publish_as<T: Serialize>(&self, msg: &T) -> Result<(), ClientError> {
        self.publish(serde_json::to_value(msg)?);
        Ok(())
    }

    /// Registers a listener for wire unsubscription.
    pub fn on_unsubscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.events.on(UNSUBSCRIBE, move |_| callback())
    }

    /// Registers a listener for advertisement withdrawal.
    pub fn on_unadvertise<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.events.on(UNADVERTISE, move |_| callback())
    }

    /// Number of local message listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.events.listener_count(MESSAGE)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.shared.options.name)
            .field("message_type", &self.shared.options.message_type)
            .field("subscribed", &self.is_subscribed())
            .field("advertised", &self.is_advertised())
            .finish()
    }
}

impl TopicShared {
    fn send(&self, message: &Message) {
        if let Err(e) = self.conn.send(message) {
            tracing::error!("Failed to send {} on {}: {}", message.op(), self.options.name, e);
        }
    }

    fn ensure_subscribed(self: &Arc<Self>) {
        let message = {
            let mut state = self.state.lock();
            if state.subscription.is_some() {
                return;
            }

            let weak = Arc::downgrade(self);
            let forward = self.conn.on(self.options.name.clone(), move |event| {
                if let (Some(shared), Event::Publish(_)) = (weak.upgrade(), event) {
                    shared.events.emit(MESSAGE, event);
                }
            });

            let id = self.conn.operation_id("subscribe", &self.options.name);
            state.subscription = Some(WireSubscription {
                id: id.clone(),
                forward,
                resend: None,
            });
            Message::Subscribe(Subscribe {
                id,
                msg_type: self.options.message_type.clone(),
                topic: self.options.name.clone(),
                compression: self.options.compression,
                throttle_rate: self.options.throttle_rate.max(0) as u64,
                queue_length: self.options.queue_length,
            })
        };

        tracing::debug!("Subscribing to {}", self.options.name);
        self.send_tracked(Role::Subscription, message);
    }

    /// Sends `message` and, when reconnecting is enabled, arms its resend.
    ///
    /// A message sent while disconnected is already queued for the next
    /// open, so its record starts out waiting for that open.
    fn send_tracked(self: &Arc<Self>, role: Role, message: Message) {
        if !self.options.reconnect_on_close {
            self.send(&message);
            return;
        }

        let deferred = !self.conn.is_connected();
        let weak = Arc::downgrade(self);
        let close_listener = self.conn.on(CLOSE, move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.resend_after_close(role);
            }
        });

        {
            let mut state = self.state.lock();
            match state.resend_slot(role) {
                Some(slot) => {
                    let previous = slot.replace(PendingResubscription {
                        message: message.clone(),
                        waiting_for_reconnect: deferred,
                        close_listener,
                    });
                    if let Some(previous) = previous {
                        self.conn.off(CLOSE, previous.close_listener);
                    }
                }
                // Torn down concurrently.
                None => {
                    self.conn.off(CLOSE, close_listener);
                }
            }
        }

        self.send(&message);
        if deferred {
            self.await_reconnect(role, message.id().map(str::to_string));
        }
    }

    /// Clears the record's waiting flag on the next `connection` event.
    fn await_reconnect(self: &Arc<Self>, role: Role, id: Option<String>) {
        let weak = Arc::downgrade(self);
        let hook_id = id.clone();
        let hook = self.conn.once(CONNECTION, move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.reconnected(role, hook_id.as_deref());
            }
        });

        // Opened before the hook was registered.
        if self.conn.is_connected() && self.conn.off(CONNECTION, hook) {
            self.reconnected(role, id.as_deref());
        }
    }

    fn resend_after_close(self: &Arc<Self>, role: Role) {
        let (message, id) = {
            let mut state = self.state.lock();
            let Some(Some(pending)) = state.resend_slot(role) else {
                return;
            };
            if pending.waiting_for_reconnect {
                return;
            }
            pending.waiting_for_reconnect = true;
            let id = pending.message.id().map(str::to_string);
            (pending.message.clone(), id)
        };

        tracing::debug!("Queueing {} for {} until reconnect", message.op(), self.options.name);
        // Disconnected, so this waits for the next `connection` event.
        self.send(&message);
        self.await_reconnect(role, id);
    }

    fn reconnected(&self, role: Role, id: Option<&str>) {
        let mut state = self.state.lock();
        if let Some(Some(pending)) = state.resend_slot(role) {
            if pending.message.id() == id {
                pending.waiting_for_reconnect = false;
            }
        }
    }

    fn forget_advertisement(&self) {
        let advertisement = self.state.lock().advertisement.take();
        if let Some(guard) = advertisement.and_then(|a| a.close_guard) {
            self.conn.off(CLOSE, guard);
        }
    }
}

impl Connection {
    /// Creates a topic using this connection's topic defaults.
    pub fn topic(
        &self,
        name: impl Into<String>,
        message_type: impl Into<String>,
    ) -> Result<Topic, ClientError> {
        let options =
            TopicOptions::from_defaults(name, message_type, &self.config().topic_defaults);
        Topic::new(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBridge, URL};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (MockBridge, Connection) {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        bridge.open();
        (bridge, conn)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move |_: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn publish(bridge: &MockBridge, topic: &str, msg: Value) {
        bridge.receive(json!({"op": "publish", "topic": topic, "msg": msg}));
    }

    #[test]
    fn test_requires_name_and_type() {
        let (_bridge, conn) = setup();
        assert!(matches!(
            conn.topic("/chatter", ""),
            Err(ClientError::MissingField("message_type"))
        ));
        assert!(matches!(
            conn.topic("", "std_msgs/String"),
            Err(ClientError::MissingField("name"))
        ));
    }

    #[test]
    fn test_negative_throttle_rate_clamped() {
        let (bridge, conn) = setup();
        let options = TopicOptions::new("/chatter", "std_msgs/String").with_throttle_rate(-10);
        let topic = Topic::new(&conn, options).unwrap();
        assert_eq!(topic.options().throttle_rate, 0);

        topic.subscribe(|_| {});
        assert_eq!(bridge.sent_ops("subscribe")[0]["throttle_rate"], 0);
    }

    #[test]
    fn test_subscribe_message() {
        let (bridge, conn) = setup();
        let options = TopicOptions::new("/scan", "sensor_msgs/LaserScan")
            .with_compression(Compression::Cbor)
            .with_throttle_rate(100)
            .with_queue_length(5);
        let topic = Topic::new(&conn, options).unwrap();
        topic.subscribe(|_| {});

        let subscribe = &bridge.sent_ops("subscribe")[0];
        assert_eq!(subscribe["id"], "subscribe:/scan:1");
        assert_eq!(subscribe["type"], "sensor_msgs/LaserScan");
        assert_eq!(subscribe["topic"], "/scan");
        assert_eq!(subscribe["compression"], "cbor");
        assert_eq!(subscribe["throttle_rate"], 100);
        assert_eq!(subscribe["queue_length"], 5);
        assert_eq!(topic.subscribe_id().as_deref(), Some("subscribe:/scan:1"));
    }

    #[test]
    fn test_listeners_share_one_wire_subscription() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let (a, count_a) = counter();
        let (b, count_b) = counter();

        topic.subscribe(count_a);
        topic.subscribe(count_b);
        assert_eq!(bridge.sent_ops("subscribe").len(), 1);

        publish(&bridge, "/chatter", json!({"data": "hi"}));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_last_listener() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let (count, callback) = counter();
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let u = unsubscribed.clone();
        topic.on_unsubscribe(move || {
            u.fetch_add(1, Ordering::SeqCst);
        });

        let id = topic.subscribe(callback);
        topic.unsubscribe(Some(id));
        publish(&bridge, "/chatter", json!({"data": "late"}));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!topic.is_subscribed());
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
        let unsubscribes = bridge.sent_ops("unsubscribe");
        assert_eq!(unsubscribes.len(), 1);
        assert_eq!(unsubscribes[0]["id"], "subscribe:/chatter:1");

        // Nothing left to unsubscribe.
        topic.unsubscribe(Some(id));
        topic.unsubscribe(None);
        assert_eq!(bridge.sent_ops("unsubscribe").len(), 1);
        assert_eq!(conn.listener_count("/chatter"), 0);
    }

    #[test]
    fn test_unsubscribe_one_of_two_listeners() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let (a, count_a) = counter();
        let (b, count_b) = counter();

        let id_a = topic.subscribe(count_a);
        topic.subscribe(count_b);
        topic.unsubscribe(Some(id_a));
        assert!(bridge.sent_ops("unsubscribe").is_empty());

        publish(&bridge, "/chatter", json!({}));
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_all() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let (count, callback) = counter();
        topic.subscribe(callback);
        topic.subscribe(|_| {});

        topic.unsubscribe(None);
        publish(&bridge, "/chatter", json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(topic.listener_count(), 0);
        assert_eq!(bridge.sent_ops("unsubscribe").len(), 1);
    }

    #[test]
    fn test_resubscribe_gets_fresh_id() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let id = topic.subscribe(|_| {});
        topic.unsubscribe(Some(id));
        topic.subscribe(|_| {});

        let ids: Vec<Value> = bridge
            .sent_ops("subscribe")
            .into_iter()
            .map(|m| m["id"].clone())
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_subscribe_as_typed() {
        #[derive(Deserialize)]
        struct StringMsg {
            data: String,
        }

        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        topic.subscribe_as(move |msg: StringMsg| s.lock().push(msg.data));

        publish(&bridge, "/chatter", json!({"data": "one"}));
        publish(&bridge, "/chatter", json!({"wrong": 1}));
        publish(&bridge, "/chatter", json!({"data": "two"}));
        assert_eq!(*seen.lock(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_subscribe_channel() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/odom", "nav_msgs/Odometry").unwrap();
        let (_id, mut rx) = topic.subscribe_channel();

        publish(&bridge, "/odom", json!({"x": 1}));
        publish(&bridge, "/odom", json!({"x": 2}));
        assert_eq!(rx.recv().await, Some(json!({"x": 1})));
        assert_eq!(rx.recv().await, Some(json!({"x": 2})));
    }

    #[test]
    fn test_publish_advertises_once() {
        let (bridge, conn) = setup();
        let options = TopicOptions::new("/cmd_vel", "geometry_msgs/Twist")
            .with_latch(true)
            .with_queue_size(10);
        let topic = Topic::new(&conn, options).unwrap();

        topic.publish(json!({"linear": {"x": 1.0}}));
        topic.publish(json!({"linear": {"x": 2.0}}));
        topic.advertise();

        let advertises = bridge.sent_ops("advertise");
        assert_eq!(advertises.len(), 1);
        assert_eq!(advertises[0]["latch"], true);
        assert_eq!(advertises[0]["queue_size"], 10);
        assert_eq!(advertises[0]["type"], "geometry_msgs/Twist");

        let publishes = bridge.sent_ops("publish");
        assert_eq!(publishes.len(), 2);
        assert_eq!(publishes[0]["latch"], true);
        assert_ne!(publishes[0]["id"], publishes[1]["id"]);
        assert!(publishes[0]["id"].as_str().unwrap().starts_with("publish:/cmd_vel:"));

        // Advertise precedes the first publish on the wire.
        let ops: Vec<Value> = bridge.sent().into_iter().map(|m| m["op"].clone()).collect();
        assert_eq!(ops, vec![json!("advertise"), json!("publish"), json!("publish")]);
    }

    #[test]
    fn test_publish_as() {
        #[derive(Serialize)]
        struct Twist {
            x: f64,
        }
        let (bridge, conn) = setup();
        let topic = conn.topic("/cmd_vel", "geometry_msgs/Twist").unwrap();
        topic.publish_as(&Twist { x: 0.5 }).unwrap();
        assert_eq!(bridge.sent_ops("publish")[0]["msg"], json!({"x": 0.5}));
    }

    #[test]
    fn test_unadvertise_idempotent() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/cmd_vel", "geometry_msgs/Twist").unwrap();
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        topic.on_unadvertise(move || {
            n.fetch_add(1, Ordering::SeqCst);
        });

        topic.unadvertise();
        assert!(bridge.sent_ops("unadvertise").is_empty());

        topic.advertise();
        let advertise_id = topic.advertise_id().unwrap();
        topic.unadvertise();
        topic.unadvertise();

        let unadvertises = bridge.sent_ops("unadvertise");
        assert_eq!(unadvertises.len(), 1);
        assert_eq!(unadvertises[0]["id"], json!(advertise_id));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(!topic.is_advertised());
    }

    #[test]
    fn test_reconnect_resubscribes_once_per_disconnect() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        topic.subscribe(|_| {});
        bridge.clear_sent();

        // Two close events before the next open.
        bridge.drop_connection();
        bridge.fire_close();
        conn.connect(URL).unwrap();
        bridge.open();

        let subscribes = bridge.sent_ops("subscribe");
        assert_eq!(subscribes.len(), 1);
        assert_eq!(subscribes[0]["id"], json!(topic.subscribe_id().unwrap()));

        // The next disconnection resends again.
        bridge.clear_sent();
        bridge.drop_connection();
        conn.connect(URL).unwrap();
        bridge.open();
        assert_eq!(bridge.sent_ops("subscribe").len(), 1);
    }

    #[test]
    fn test_reconnect_resends_subscribe_and_advertise() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        topic.subscribe(|_| {});
        topic.advertise();
        bridge.clear_sent();

        bridge.drop_connection();
        conn.connect(URL).unwrap();
        bridge.open();

        assert_eq!(bridge.sent_ops("subscribe").len(), 1);
        assert_eq!(bridge.sent_ops("advertise").len(), 1);
        assert!(topic.is_advertised());
    }

    #[test]
    fn test_no_resend_after_unsubscribe() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let id = topic.subscribe(|_| {});
        topic.unsubscribe(Some(id));
        bridge.clear_sent();

        bridge.drop_connection();
        conn.connect(URL).unwrap();
        bridge.open();
        assert!(bridge.sent().is_empty());
        assert_eq!(conn.listener_count(CLOSE), 0);
    }

    #[test]
    fn test_without_reconnect_close_clears_advertisement() {
        let (bridge, conn) = setup();
        let options =
            TopicOptions::new("/cmd_vel", "geometry_msgs/Twist").with_reconnect_on_close(false);
        let topic = Topic::new(&conn, options).unwrap();
        topic.subscribe(|_| {});
        topic.advertise();
        bridge.clear_sent();

        bridge.drop_connection();
        assert!(!topic.is_advertised());
        assert_eq!(conn.listener_count(CLOSE), 0);

        conn.connect(URL).unwrap();
        bridge.open();
        assert!(bridge.sent().is_empty());

        // Publishing advertises afresh.
        topic.publish(json!({}));
        assert_eq!(bridge.sent_ops("advertise").len(), 1);
    }

    #[test]
    fn test_subscribe_before_open_is_deferred() {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        topic.subscribe(|_| {});
        assert!(bridge.sent().is_empty());

        bridge.open();
        assert_eq!(bridge.sent_ops("subscribe").len(), 1);
    }

    #[test]
    fn test_close_before_first_open_sends_one_subscribe() {
        let bridge = MockBridge::new();
        let conn = bridge.connection();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        topic.subscribe(|_| {});
        topic.advertise();

        // The first connect fails before opening.
        bridge.drop_connection();
        conn.connect(URL).unwrap();
        bridge.open();

        let subscribes = bridge.sent_ops("subscribe");
        assert_eq!(subscribes.len(), 1);
        assert_eq!(subscribes[0]["id"], json!(topic.subscribe_id().unwrap()));
        assert_eq!(bridge.sent_ops("advertise").len(), 1);

        // Later disconnections still resend.
        bridge.clear_sent();
        bridge.drop_connection();
        conn.connect(URL).unwrap();
        bridge.open();
        assert_eq!(bridge.sent_ops("subscribe").len(), 1);
        assert_eq!(bridge.sent_ops("advertise").len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let (bridge, conn) = setup();
        let topic = conn.topic("/chatter", "std_msgs/String").unwrap();
        let other = topic.clone();
        topic.advertise();
        other.advertise();
        assert!(other.is_advertised());
        assert_eq!(bridge.sent_ops("advertise").len(), 1);
    }
}
