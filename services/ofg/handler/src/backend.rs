//! The connection operations a handler relies on.

use ofg_session::{Connection, MessageSink};
use ofg_wire::Message;

/// A backend connection as seen by [`ConnectionHandler`](crate::ConnectionHandler)
pub trait Backend: MessageSink + 'static {
    /// Process-unique connection id
    fn connection_id(&self) -> u64;

    /// `host:port` of the backend, used for credential prompts and logs
    fn server(&self) -> String;

    /// Whether sends are currently accepted
    fn is_connected(&self) -> bool;

    /// Take the request a reply with `xid` answers
    fn pop_request(&self, xid: u32) -> Option<Message>;

    /// Drop the socket and dial again
    fn reconnect(&self);

    /// Stop the connection without waiting for it
    fn request_shutdown(&self);
}

impl Backend for Connection {
    fn connection_id(&self) -> u64 {
        self.id()
    }

    fn server(&self) -> String {
        self.addr()
    }

    fn is_connected(&self) -> bool {
        Connection::is_connected(self)
    }

    fn pop_request(&self, xid: u32) -> Option<Message> {
        Connection::pop_request(self, xid)
    }

    fn reconnect(&self) {
        Connection::reconnect(self)
    }

    fn request_shutdown(&self) {
        Connection::request_shutdown(self)
    }
}
