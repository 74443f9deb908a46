//! WAMP adapter: the innermost layer.
//!
//! Frames are JSON arrays whose first element is the message type code. The
//! adapter checks that shape and nothing more; what the codes mean is up to
//! the [`WampApplication`].

use std::rc::Rc;

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::events::{EventDispatcher, ServerEvent};
use crate::stack::{Connection, ConnectionError, MessageComponent};

/// Sub-protocol advertised during the WebSocket handshake.
pub const WAMP_SUBPROTOCOL: &str = "wamp";

/// One WAMP message: a type code followed by opaque arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct WampMessage {
    code: u64,
    args: Vec<Value>,
}

impl WampMessage {
    pub fn new(code: u64, args: Vec<Value>) -> Self {
        Self { code, args }
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ConnectionError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ConnectionError::Protocol(format!("invalid JSON: {}", e)))?;

        let Value::Array(mut items) = value else {
            return Err(ConnectionError::Protocol("message is not a JSON array".to_string()));
        };
        if items.is_empty() {
            return Err(ConnectionError::Protocol("empty message".to_string()));
        }
        let code = items[0]
            .as_u64()
            .ok_or_else(|| ConnectionError::Protocol("message type is not an unsigned integer".to_string()))?;
        items.remove(0);

        Ok(Self { code, args: items })
    }

    /// Serialize into the JSON array form.
    pub fn to_text(&self) -> String {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(Value::from(self.code));
        items.extend(self.args.iter().cloned());
        Value::Array(items).to_string()
    }

    /// Text frame carrying this message.
    pub fn to_frame(&self) -> Message {
        Message::text(self.to_text())
    }
}

/// Application logic behind the WAMP adapter.
///
/// Hooks run on the reactor thread and must not block. Keep a clone of
/// [`Connection::handle`] to push messages outside of a hook.
pub trait WampApplication {
    fn on_open(&self, _conn: &Connection) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn on_message(&self, conn: &Connection, message: WampMessage) -> Result<(), ConnectionError>;

    fn on_close(&self, _conn: &Connection) {}

    fn on_error(&self, _conn: &Connection, _error: &ConnectionError) {}
}

pub struct WampServer {
    application: Rc<dyn WampApplication>,
    dispatcher: Rc<EventDispatcher>,
}

impl WampServer {
    pub fn new(application: Rc<dyn WampApplication>, dispatcher: Rc<EventDispatcher>) -> Self {
        Self {
            application,
            dispatcher,
        }
    }
}

impl MessageComponent for WampServer {
    fn name(&self) -> &'static str {
        "wamp"
    }

    fn sub_protocols(&self) -> Vec<String> {
        vec![WAMP_SUBPROTOCOL.to_string()]
    }

    fn on_open(&self, conn: &mut Connection) -> Result<(), ConnectionError> {
        self.dispatcher.dispatch(&ServerEvent::ClientConnected {
            id: conn.id(),
            peer: conn.peer(),
        });
        self.application.on_open(conn)
    }

    fn on_message(&self, conn: &mut Connection, message: Message) -> Result<(), ConnectionError> {
        match message {
            Message::Text(text) => {
                let message = WampMessage::parse(text.as_str())?;
                self.application.on_message(conn, message)
            }
            Message::Binary(_) => Err(ConnectionError::Unsupported("binary frames are not supported")),
            _ => Ok(()),
        }
    }

    fn on_close(&self, conn: &mut Connection) {
        self.application.on_close(conn);
        self.dispatcher.dispatch(&ServerEvent::ClientDisconnected {
            id: conn.id(),
            peer: conn.peer(),
        });
    }

    fn on_error(&self, conn: &mut Connection, error: &ConnectionError) {
        self.application.on_error(conn, error);
        self.dispatcher.dispatch(&ServerEvent::ClientError {
            id: conn.id(),
            peer: conn.peer(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::testing::connection;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Echo {
        seen: RefCell<Vec<WampMessage>>,
    }

    impl WampApplication for Echo {
        fn on_message(&self, conn: &Connection, message: WampMessage) -> Result<(), ConnectionError> {
            conn.send(message.to_frame())?;
            self.seen.borrow_mut().push(message);
            Ok(())
        }
    }

    fn server() -> (WampServer, Rc<Echo>, Rc<RefCell<Vec<&'static str>>>) {
        let app = Rc::new(Echo::default());
        let dispatcher = Rc::new(EventDispatcher::new());
        let events = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&events);
        dispatcher.subscribe(move |event| sink.borrow_mut().push(event.name()));

        (WampServer::new(app.clone(), dispatcher), app, events)
    }

    #[test]
    fn parses_code_and_args() {
        let message = WampMessage::parse(r#"[2, "call-1", "http://example.com/add", 1, 2]"#).unwrap();
        assert_eq!(message.code(), 2);
        assert_eq!(message.args(), [json!("call-1"), json!("http://example.com/add"), json!(1), json!(2)]);
    }

    #[test]
    fn rejects_malformed_frames() {
        for text in ["not json", "{}", "[]", r#"["2"]"#, "[-1]"] {
            let err = WampMessage::parse(text).unwrap_err();
            assert!(matches!(err, ConnectionError::Protocol(_)), "{text} should be a protocol error");
        }
    }

    #[test]
    fn serializes_as_array() {
        let message = WampMessage::new(8, vec![json!("topic"), json!({"a": 1})]);
        assert_eq!(message.to_text(), r#"[8,"topic",{"a":1}]"#);
    }

    #[test]
    fn routes_text_frames_to_application() {
        let (server, app, _) = server();
        let (mut conn, mut rx) = connection(&[]);

        server.on_message(&mut conn, Message::text("[5,\"topic\"]")).unwrap();

        assert_eq!(*app.seen.borrow(), vec![WampMessage::new(5, vec![json!("topic")])]);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn binary_frames_are_unsupported() {
        let (server, app, _) = server();
        let (mut conn, _rx) = connection(&[]);

        let err = server
            .on_message(&mut conn, Message::binary(vec![1, 2, 3]))
            .unwrap_err();

        assert!(matches!(err, ConnectionError::Unsupported(_)));
        assert!(app.seen.borrow().is_empty());
    }

    #[test]
    fn lifecycle_events_are_dispatched() {
        let (server, _, events) = server();
        let (mut conn, _rx) = connection(&[]);

        server.on_open(&mut conn).unwrap();
        server.on_error(&mut conn, &ConnectionError::Protocol("bad".into()));
        server.on_close(&mut conn);

        assert_eq!(
            *events.borrow(),
            vec!["client.connected", "client.error", "client.disconnected"]
        );
    }

    #[test]
    fn advertises_wamp_subprotocol() {
        let (server, _, _) = server();
        assert_eq!(server.sub_protocols(), vec![WAMP_SUBPROTOCOL]);
    }
}
