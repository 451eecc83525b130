//! Channel pair standing in for one message-oriented socket.
//!
//! The primary connection and the relay set only ever see a [`SocketLink`];
//! a pump task owned by the transport moves frames between the link and the
//! real WebSocket. Tests drive the far end ([`LinkPeer`]) directly.

use tokio::sync::mpsc;

/// Local end of a socket: frames to send and frames received.
///
/// Dropping `outbound` closes the socket; `inbound` yielding `None` means the
/// socket is gone.
#[derive(Debug)]
pub struct SocketLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Far end of a socket, held by the transport pump (or a test).
#[derive(Debug)]
pub struct LinkPeer {
    /// Frames travelling towards the local end
    pub to_local: mpsc::Sender<String>,
    /// Frames the local end sent
    pub from_local: mpsc::Receiver<String>,
}

/// Create a connected link/peer pair.
pub fn pair(buffer: usize) -> (SocketLink, LinkPeer) {
    let (out_tx, out_rx) = mpsc::channel(buffer);
    let (in_tx, in_rx) = mpsc::channel(buffer);
    (
        SocketLink {
            outbound: out_tx,
            inbound: in_rx,
        },
        LinkPeer {
            to_local: in_tx,
            from_local: out_rx,
        },
    )
}
