//! Connection actor: owns one TCP connection, runs a receive loop dispatching
//! by message kind, and exposes blocking request/response calls backed by
//! single-slot mailboxes (oneshot channels filled by the loop).

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shoal_core::{integrity, wire, Message, PeerAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::runtime::NodeRuntime;
use crate::{discovery, election};

/// Fail-fast timeout for outbound dials; steady-state reads have no timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on every mailbox wait.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Downloads move whole files; give them a wider bound.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("peer unreachable: {0}")]
    Unreachable(io::Error),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("connection closed")]
    Closed,
    #[error("request timed out")]
    RequestTimeout,
    #[error(transparent)]
    Encode(#[from] wire::FrameEncodeError),
}

/// A fetched file as the remote peer presented it. The digest is the sender's
/// claim; callers verify it against the bytes before trusting either.
#[derive(Debug)]
pub struct FetchedFile {
    pub file_name: String,
    pub digest: [u8; 32],
    pub bytes: Vec<u8>,
}

/// One pending-response slot per request kind. The receive loop fills them;
/// request methods arm them. At most one request per kind is outstanding.
#[derive(Default)]
struct Mailboxes {
    leader_check: Option<oneshot::Sender<bool>>,
    dht_ack: Option<oneshot::Sender<bool>>,
    file_list: Option<oneshot::Sender<Option<Vec<String>>>>,
    file_sources: Option<oneshot::Sender<Option<Vec<PeerAddr>>>>,
    download: Option<oneshot::Sender<FetchedFile>>,
}

impl Mailboxes {
    /// Drop every armed slot so waiters fail fast instead of timing out.
    fn clear(&mut self) {
        self.leader_check = None;
        self.dht_ack = None;
        self.file_list = None;
        self.file_sources = None;
        self.download = None;
    }
}

/// Everything the receive loop shares with the handle.
struct ActorCtx {
    addr: PeerAddr,
    tracked: bool,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    mailboxes: Arc<Mutex<Mailboxes>>,
    running: Arc<AtomicBool>,
    runtime: Arc<NodeRuntime>,
}

pub struct Connection {
    addr: PeerAddr,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    mailboxes: Arc<Mutex<Mailboxes>>,
    running: Arc<AtomicBool>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Dial a peer's listener. Fails fast on unreachable peers; once the
    /// connection is up there is no read timeout.
    pub async fn dial(
        addr: PeerAddr,
        runtime: Arc<NodeRuntime>,
    ) -> Result<Arc<Self>, ConnectionError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr.socket_addr()))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout)?
            .map_err(ConnectionError::Unreachable)?;
        info!(peer = %addr, "connection out");
        Ok(Self::spawn(stream, addr, false, runtime))
    }

    /// Adopt an already-accepted inbound stream. Tracked connections count
    /// toward the listener's concurrency ceiling.
    pub fn adopt(
        stream: TcpStream,
        addr: PeerAddr,
        tracked: bool,
        runtime: Arc<NodeRuntime>,
    ) -> Arc<Self> {
        info!(peer = %addr, tracked, "connection in");
        Self::spawn(stream, addr, tracked, runtime)
    }

    fn spawn(
        stream: TcpStream,
        addr: PeerAddr,
        tracked: bool,
        runtime: Arc<NodeRuntime>,
    ) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let mailboxes = Arc::new(Mutex::new(Mailboxes::default()));
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(write_loop(write_half, outbox_rx));
        let ctx = ActorCtx {
            addr,
            tracked,
            outbox: outbox.clone(),
            mailboxes: mailboxes.clone(),
            running: running.clone(),
            runtime,
        };
        let recv_task = tokio::spawn(receive_loop(read_half, ctx));
        Arc::new(Self {
            addr,
            outbox,
            mailboxes,
            running,
            recv_task: Mutex::new(Some(recv_task)),
        })
    }

    pub fn peer_addr(&self) -> PeerAddr {
        self.addr
    }

    /// Queue one framed message; the writer task transmits it in
    /// `PACKET_LEN`-sized chunks, in queue order.
    pub fn send(&self, msg: &Message) -> Result<(), ConnectionError> {
        let frame = wire::encode_frame(msg)?;
        self.outbox.send(frame).map_err(|_| ConnectionError::Closed)
    }

    /// Ask the peer whether it currently holds leadership.
    pub async fn leader_check(&self, from: PeerAddr) -> Result<bool, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().await.leader_check = Some(tx);
        self.send(&Message::LeaderCheck { from })?;
        await_reply(rx, REQUEST_TIMEOUT).await
    }

    /// Report our hosted files to the peer. `true` means a leader accepted them.
    pub async fn update_dht(
        &self,
        from: PeerAddr,
        file_names: Vec<String>,
    ) -> Result<bool, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().await.dht_ack = Some(tx);
        self.send(&Message::UpdateDht { from, file_names })?;
        await_reply(rx, REQUEST_TIMEOUT).await
    }

    /// Ask for the indexed file list. `None` means the peer is not leader.
    pub async fn request_file_list(&self) -> Result<Option<Vec<String>>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().await.file_list = Some(tx);
        self.send(&Message::RequestFileList)?;
        await_reply(rx, REQUEST_TIMEOUT).await
    }

    /// Ask which peers host `file_name`. `None` means the peer is not leader.
    pub async fn request_file_sources(
        &self,
        file_name: &str,
    ) -> Result<Option<Vec<PeerAddr>>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().await.file_sources = Some(tx);
        self.send(&Message::RequestFileSources {
            file_name: file_name.to_string(),
        })?;
        await_reply(rx, REQUEST_TIMEOUT).await
    }

    /// Fetch a file's bytes from the hosting peer.
    pub async fn download(&self, file_name: &str) -> Result<FetchedFile, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.mailboxes.lock().await.download = Some(tx);
        self.send(&Message::Download {
            file_name: file_name.to_string(),
        })?;
        await_reply(rx, DOWNLOAD_TIMEOUT).await
    }

    /// Announce that `new_leader` has taken leadership. Fire and forget.
    pub fn notify_leader(&self, new_leader: PeerAddr) -> Result<(), ConnectionError> {
        self.send(&Message::UpdateLeader { new_leader })
    }

    /// Ask the leader to drop every index entry for `addr`. Fire and forget.
    pub fn deactivate(&self, addr: PeerAddr) -> Result<(), ConnectionError> {
        self.send(&Message::DeactivateNode { addr })
    }

    /// Tear down: best-effort Disconnect frame, then close. Safe to call more
    /// than once; only the first call acts.
    pub async fn disconnect(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.send(&Message::Disconnect);
        // The goodbye is already queued; aborting the reader only drops the
        // read half, the writer still drains the outbox.
        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }
        info!(peer = %self.addr, "disconnected");
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<T>, limit: Duration) -> Result<T, ConnectionError> {
    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(_)) => Err(ConnectionError::Closed),
        Err(_) => Err(ConnectionError::RequestTimeout),
    }
}

/// Writer task: one frame at a time, chunked, queue order preserved.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        for chunk in frame.chunks(wire::PACKET_LEN) {
            if writer.write_all(chunk).await.is_err() {
                return;
            }
        }
        if writer.flush().await.is_err() {
            return;
        }
    }
}

/// Read one frame. `Ok(None)` means the peer closed the connection before a
/// header arrived, which callers treat as an implicit Disconnect.
async fn read_frame(reader: &mut OwnedReadHalf) -> io::Result<Option<Message>> {
    let mut header = [0u8; wire::HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = wire::decode_header(&header)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    // The payload arrives in chunks; each read may return fewer bytes than
    // asked for, so accumulate until the declared length is in.
    let mut payload = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let want = wire::PACKET_LEN.min(len - filled);
        let n = reader.read(&mut payload[filled..filled + want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed mid-frame",
            ));
        }
        filled += n;
    }
    wire::decode_payload(&payload)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

async fn receive_loop(mut reader: OwnedReadHalf, ctx: ActorCtx) {
    while ctx.running.load(Ordering::SeqCst) {
        let msg = match read_frame(&mut reader).await {
            Ok(Some(msg)) => msg,
            Ok(None) => Message::Disconnect,
            Err(err) => {
                warn!(peer = %ctx.addr, %err, "read failed");
                Message::Disconnect
            }
        };
        if !dispatch(&ctx, msg).await {
            break;
        }
    }
}

/// Handle one inbound message. Returns false when the loop should stop.
async fn dispatch(ctx: &ActorCtx, msg: Message) -> bool {
    match msg {
        Message::LeaderCheck { from } => {
            let is_leader = ctx.runtime.is_leader().await;
            reply(ctx, &Message::LeaderCheckResponse { is_leader });
            debug!(peer = %from, is_leader, "leader check");
            if !ctx.runtime.knows_peer(from).await {
                // A node we have never scanned is talking to us; refresh.
                let runtime = ctx.runtime.clone();
                tokio::spawn(async move {
                    discovery::refresh(&runtime).await;
                });
            }
        }
        Message::LeaderCheckResponse { is_leader } => {
            deliver(ctx.mailboxes.lock().await.leader_check.take(), is_leader);
        }
        Message::UpdateLeader { new_leader } => {
            handle_update_leader(ctx, new_leader).await;
        }
        Message::UpdateDht { from, file_names } => {
            let accepted = ctx.runtime.dht_update(from, &file_names).await;
            if accepted {
                info!(peer = %from, files = file_names.len(), "index updated");
            } else {
                debug!(peer = %from, "file report refused, not leader");
            }
            reply(ctx, &Message::UpdateDhtResponse { accepted });
        }
        Message::UpdateDhtResponse { accepted } => {
            deliver(ctx.mailboxes.lock().await.dht_ack.take(), accepted);
        }
        Message::RequestFileList => {
            let reply_msg = match ctx.runtime.dht_file_list().await {
                Some(file_names) => Message::FileListResponse {
                    ok: true,
                    file_names,
                },
                None => Message::FileListResponse {
                    ok: false,
                    file_names: Vec::new(),
                },
            };
            reply(ctx, &reply_msg);
        }
        Message::FileListResponse { ok, file_names } => {
            let value = ok.then_some(file_names);
            deliver(ctx.mailboxes.lock().await.file_list.take(), value);
        }
        Message::RequestFileSources { file_name } => {
            let reply_msg = match ctx.runtime.dht_sources(&file_name).await {
                Some(sources) => Message::FileSourcesResponse { ok: true, sources },
                None => Message::FileSourcesResponse {
                    ok: false,
                    sources: Vec::new(),
                },
            };
            reply(ctx, &reply_msg);
        }
        Message::FileSourcesResponse { ok, sources } => {
            let value = ok.then_some(sources);
            deliver(ctx.mailboxes.lock().await.file_sources.take(), value);
        }
        Message::DeactivateNode { addr } => {
            if ctx.runtime.dht_delete(addr).await {
                info!(peer = %addr, "removed from index");
            }
        }
        Message::Download { file_name } => {
            handle_download(ctx, file_name).await;
        }
        Message::DownloadResponse {
            file_name,
            digest,
            bytes,
        } => {
            let fetched = FetchedFile {
                file_name,
                digest,
                bytes,
            };
            deliver(ctx.mailboxes.lock().await.download.take(), fetched);
        }
        Message::TestStart => {
            ctx.runtime.signal_test_start();
        }
        Message::Disconnect => {
            handle_disconnect(ctx).await;
            return false;
        }
    }
    true
}

/// Adopt the announced leader, then report our files to it; a leader we
/// cannot reach forces a fresh election before retrying.
async fn handle_update_leader(ctx: &ActorCtx, new_leader: PeerAddr) {
    info!(leader = %new_leader, "new leader announced");
    if let Some(held) = ctx.runtime.adopt_leader(new_leader).await {
        info!(held = ?held, "leadership lost");
    }
    election::register_with_leader(&ctx.runtime).await;
}

/// Serve a download from the local store. A file we cannot read gets no
/// response; the requester's timeout moves it on to its next source.
async fn handle_download(ctx: &ActorCtx, file_name: String) {
    let started = Instant::now();
    let bytes = match ctx.runtime.store().read(&file_name) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(file = %file_name, %err, "download requested for unreadable file");
            return;
        }
    };
    let digest = integrity::digest(&bytes);
    let size = bytes.len();
    reply(
        ctx,
        &Message::DownloadResponse {
            file_name: file_name.clone(),
            digest,
            bytes,
        },
    );
    info!(
        file = %file_name,
        peer = %ctx.addr,
        bytes = size,
        elapsed = ?started.elapsed(),
        "upload"
    );
}

async fn handle_disconnect(ctx: &ActorCtx) {
    ctx.running.store(false, Ordering::SeqCst);
    ctx.mailboxes.lock().await.clear();
    info!(peer = %ctx.addr, "peer disconnected");
    if ctx.tracked {
        let remaining = ctx.runtime.tracked_decr().await;
        debug!(active = remaining, "tracked connections");
        if remaining == 0 && ctx.runtime.is_leader().await {
            // Last inbound connection gone while we hold the index:
            // re-validate leadership against the network.
            let runtime = ctx.runtime.clone();
            tokio::spawn(async move {
                election::establish(&runtime).await;
            });
        }
    }
}

fn reply(ctx: &ActorCtx, msg: &Message) {
    match wire::encode_frame(msg) {
        Ok(frame) => {
            let _ = ctx.outbox.send(frame);
        }
        Err(err) => warn!(peer = %ctx.addr, %err, "could not encode reply"),
    }
}

fn deliver<T>(slot: Option<oneshot::Sender<T>>, value: T) {
    match slot {
        Some(tx) => {
            let _ = tx.send(value);
        }
        None => debug!("response arrived with no request waiting"),
    }
}
