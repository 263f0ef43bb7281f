//! WebSocket transport.
//!
//! Each transport owns one background task on the ambient tokio runtime.
//! The task connects, reports lifecycle events to the handler, forwards
//! inbound frames and drains an unbounded queue of outbound text frames.

use crate::config::BinaryMode;
use crate::transport::{
    CloseEvent, ReadyState, Transport, TransportError, TransportFactory, TransportHandler,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rosbridge_protocol::Frame;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Creates WebSocket transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory {
    binary_mode: BinaryMode,
}

impl WebSocketFactory {
    pub fn new(binary_mode: BinaryMode) -> Self {
        Self { binary_mode }
    }
}

impl TransportFactory for WebSocketFactory {
    fn create(
        &self,
        url: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (outbound, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting.to_u8()));

        tracing::debug!("Opening WebSocket to {}", url);
        runtime.spawn(run(
            url.to_string(),
            rx,
            handler,
            state.clone(),
            self.binary_mode,
        ));

        Ok(Arc::new(WebSocketTransport { outbound, state }))
    }
}

/// Handle to a WebSocket driven by a background task.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<WsMessage>,
    state: Arc<AtomicU8>,
}

impl Transport for WebSocketTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        match self.ready_state() {
            ReadyState::Closing | ReadyState::Closed => Err(TransportError::Closed),
            _ => self
                .outbound
                .send(WsMessage::Text(text))
                .map_err(|_| TransportError::Closed),
        }
    }

    fn close(&self) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.state
            .store(ReadyState::Closing.to_u8(), Ordering::SeqCst);
        let _ = self.outbound.send(WsMessage::Close(None));
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

async fn run(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    handler: Arc<dyn TransportHandler>,
    state: Arc<AtomicU8>,
    binary_mode: BinaryMode,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::debug!("WebSocket connect to {} failed: {}", url, e);
            state.store(ReadyState::Closed.to_u8(), Ordering::SeqCst);
            let err = TransportError::Connect {
                url,
                reason: e.to_string(),
            };
            handler.on_error(err.to_string());
            handler.on_close(CloseEvent::new(None, "connect failed"));
            return;
        }
    };

    // A close requested while connecting wins over the open.
    if state
        .compare_exchange(
            ReadyState::Connecting.to_u8(),
            ReadyState::Open.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
    {
        tracing::debug!("WebSocket to {} open", url);
        handler.on_open();
    }

    let (mut sink, mut stream) = ws.split();
    let mut close_event = CloseEvent::default();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(WsMessage::Close(frame)) => {
                    let _ = sink.send(WsMessage::Close(frame)).await;
                    // Keep reading until the peer acknowledges the close.
                }
                Some(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        tracing::debug!("WebSocket send failed: {}", e);
                        handler.on_error(e.to_string());
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => handler.on_message(Frame::Text(text)),
                Some(Ok(WsMessage::Binary(data))) => {
                    let data = Bytes::from(data);
                    handler.on_message(match binary_mode {
                        BinaryMode::Buffer => Frame::Buffer(data),
                        BinaryMode::Blob => Frame::Blob(data),
                    });
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_event = CloseEvent::new(Some(u16::from(frame.code)), frame.reason.to_string());
                    }
                    break;
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("WebSocket read failed: {}", e);
                    handler.on_error(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    state.store(ReadyState::Closed.to_u8(), Ordering::SeqCst);
    tracing::debug!("WebSocket to {} closed", url);
    handler.on_close(close_event);
}
