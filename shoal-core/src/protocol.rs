//! Shoal wire protocol: message types.

use serde::{Deserialize, Serialize};

use crate::peer::PeerAddr;

/// All wire message types. Encoding is bincode; framing is the ASCII length
/// header (see wire module). Request/response pairs share a connection and are
/// strictly ordered; at most one request per kind is outstanding at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Ask a peer whether it currently holds leadership.
    LeaderCheck { from: PeerAddr },
    /// Answer to a leader check.
    LeaderCheckResponse { is_leader: bool },
    /// Announce that the sender has taken leadership.
    UpdateLeader { new_leader: PeerAddr },
    /// Report the sender's hosted files to the leader.
    UpdateDht {
        from: PeerAddr,
        file_names: Vec<String>,
    },
    /// Ack for UpdateDht; `accepted` is false when the receiver is not leader.
    UpdateDhtResponse { accepted: bool },
    /// Ask the leader for the full indexed file list.
    RequestFileList,
    /// File list answer; `ok` is false when the receiver is not leader.
    FileListResponse {
        ok: bool,
        file_names: Vec<String>,
    },
    /// Ask the leader which peers host a file.
    RequestFileSources { file_name: String },
    /// Source list answer; `ok` is false when the receiver is not leader.
    FileSourcesResponse {
        ok: bool,
        sources: Vec<PeerAddr>,
    },
    /// Fetch a file's bytes from a hosting peer.
    Download { file_name: String },
    /// File payload plus the sender's digest over `bytes`.
    DownloadResponse {
        file_name: String,
        digest: [u8; 32],
        bytes: Vec<u8>,
    },
    /// Remove every index entry for `addr` (sent to the leader).
    DeactivateNode { addr: PeerAddr },
    /// Graceful connection teardown.
    Disconnect,
    /// Kick off the scripted test pass on the receiving node.
    TestStart,
}
