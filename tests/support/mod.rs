//! In-process stand-in for a tracker and a storage node. One listener plays
//! both roles: tracker queries nominate the listener itself as the storage
//! node, so a client needs only this address.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fdfs_client::protocol::request::encode_metadata;
use fdfs_client::protocol::response::decode_metadata;
use fdfs_client::protocol::{
    Command, Header, DOMAIN_NAME_LEN, EXT_NAME_LEN, GROUP_NAME_LEN, IP_ADDRESS_LEN,
    PREFIX_NAME_LEN, SOURCE_IP_LEN, STORAGE_ID_LEN, STORAGE_STATUS_ACTIVE, STORAGE_STAT_COUNTERS,
    VERSION_LEN,
};
use fdfs_client::utils::crc::crc32;
use fdfs_client::{ClientConfig, Metadata};

pub const DEFAULT_GROUP: &str = "group1";
pub const STORAGE_IP: &str = "127.0.0.1";
pub const CAPACITY_MB: u64 = 4096;
pub const HEART_BEAT: u64 = 1_700_000_000;

/// Misbehaviour injected into download replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Declare the full length, send half, then close
    TruncateDownloads,
    /// Accept the request, never answer, and wait for the client to hang up
    StallDownloads,
}

#[derive(Debug, Clone)]
struct StoredFile {
    group: String,
    data: Vec<u8>,
    metadata: Metadata,
    created: u64,
    appender: bool,
}

#[derive(Default)]
struct State {
    files: HashMap<String, StoredFile>,
    uploads: u64,
    downloads: u64,
}

pub struct MockCluster {
    pub addr: SocketAddr,
    state: Arc<Mutex<State>>,
    fault: Arc<Mutex<Fault>>,
    pub requests: Arc<AtomicU64>,
    hangups: Arc<AtomicU64>,
}

impl MockCluster {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock cluster");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(State::default()));
        let fault = Arc::new(Mutex::new(Fault::None));
        let requests = Arc::new(AtomicU64::new(0));
        let counter = Arc::new(AtomicU64::new(1));
        let hangups = Arc::new(AtomicU64::new(0));

        {
            let state = Arc::clone(&state);
            let fault = Arc::clone(&fault);
            let requests = Arc::clone(&requests);
            let hangups = Arc::clone(&hangups);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    let handler = Handler {
                        port: addr.port(),
                        state: Arc::clone(&state),
                        fault: Arc::clone(&fault),
                        counter: Arc::clone(&counter),
                        hangups: Arc::clone(&hangups),
                    };
                    requests.fetch_add(1, Ordering::SeqCst);
                    thread::spawn(move || handler.serve(stream));
                }
            });
        }

        Self {
            addr,
            state,
            fault,
            requests,
            hangups,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_hosts([self.addr.to_string()]);
        config.connect_timeout_secs = 5;
        config.network_timeout_secs = 5;
        config
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap() = fault;
    }

    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).map(|f| f.data.clone())
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    /// Stalled connections whose client has closed the socket
    pub fn hangups(&self) -> u64 {
        self.hangups.load(Ordering::SeqCst)
    }

    /// Blocks until a stalled connection sees its client hang up.
    pub fn wait_for_hangup(&self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.hangups() > 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.hangups() > 0
    }
}

struct Handler {
    port: u16,
    state: Arc<Mutex<State>>,
    fault: Arc<Mutex<Fault>>,
    counter: Arc<AtomicU64>,
    hangups: Arc<AtomicU64>,
}

impl Handler {
    fn serve(self, mut stream: TcpStream) {
        let Some((header, body)) = read_request(&mut stream) else {
            return;
        };
        let Some(command) = Command::from_code(header.command) else {
            let _ = respond(&mut stream, 22, &[]);
            return;
        };

        if command == Command::DownloadFile {
            let fault = *self.fault.lock().unwrap();
            match fault {
                Fault::None => {}
                Fault::StallDownloads => {
                    self.stall(&mut stream);
                    return;
                }
                Fault::TruncateDownloads => {
                    if let Ok((status, reply)) = self.download(&body) {
                        if status == 0 {
                            let mut frame = Header::new(reply.len() as u64, Command::Response).encode().to_vec();
                            frame.extend_from_slice(&reply[..reply.len() / 2]);
                            let _ = stream.write_all(&frame);
                            return;
                        }
                    }
                }
            }
        }

        let (status, reply) = match self.dispatch(command, &body) {
            Ok(answer) => answer,
            Err(()) => (22, Vec::new()),
        };
        let _ = respond(&mut stream, status, &reply);
    }

    fn dispatch(&self, command: Command, body: &[u8]) -> Result<(u8, Vec<u8>), ()> {
        match command {
            Command::QueryStoreWithoutGroup => Ok((0, self.store_endpoint(DEFAULT_GROUP))),
            Command::QueryStoreWithGroup => {
                let group = fixed(body.get(..GROUP_NAME_LEN).ok_or(())?);
                if group.starts_with("full") {
                    return Ok((28, Vec::new()));
                }
                Ok((0, self.store_endpoint(&group)))
            }
            Command::QueryFetchOne | Command::QueryUpdate => {
                let (group, _) = split_file_id(body)?;
                let mut reply = pad(&group, GROUP_NAME_LEN);
                reply.extend(pad(STORAGE_IP, IP_ADDRESS_LEN));
                reply.extend((self.port as u64).to_be_bytes());
                Ok((0, reply))
            }
            Command::UploadFile | Command::UploadAppenderFile => {
                self.upload(body, command == Command::UploadAppenderFile)
            }
            Command::UploadSlaveFile => self.upload_slave(body),
            Command::DownloadFile => self.download(body),
            Command::DeleteFile => {
                let (_, path) = split_file_id(body)?;
                let removed = self.state.lock().unwrap().files.remove(&path);
                Ok((if removed.is_some() { 0 } else { 2 }, Vec::new()))
            }
            Command::QueryFileInfo => {
                let (_, path) = split_file_id(body)?;
                let state = self.state.lock().unwrap();
                let Some(file) = state.files.get(&path) else {
                    return Ok((2, Vec::new()));
                };
                let mut reply = Vec::new();
                reply.extend((file.data.len() as u64).to_be_bytes());
                reply.extend(file.created.to_be_bytes());
                reply.extend((crc32(&file.data) as u64).to_be_bytes());
                reply.extend(pad(STORAGE_IP, SOURCE_IP_LEN));
                Ok((0, reply))
            }
            Command::GetMetadata => {
                let (_, path) = split_file_id(body)?;
                let state = self.state.lock().unwrap();
                match state.files.get(&path) {
                    Some(file) => Ok((0, encode_metadata(&file.metadata))),
                    None => Ok((2, Vec::new())),
                }
            }
            Command::SetMetadata => {
                let name_len = be(body, 0)? as usize;
                let meta_len = be(body, 8)? as usize;
                let flag = *body.get(16).ok_or(())?;
                let rest = body.get(17..).ok_or(())?;
                let path = bytes_str(rest.get(GROUP_NAME_LEN..GROUP_NAME_LEN + name_len).ok_or(())?);
                let meta = rest
                    .get(GROUP_NAME_LEN + name_len..GROUP_NAME_LEN + name_len + meta_len)
                    .ok_or(())?;
                let incoming = decode_metadata(meta).map_err(|_| ())?;

                let mut state = self.state.lock().unwrap();
                let Some(file) = state.files.get_mut(&path) else {
                    return Ok((2, Vec::new()));
                };
                if flag == b'O' {
                    file.metadata = incoming;
                } else {
                    file.metadata.extend(incoming);
                }
                Ok((0, Vec::new()))
            }
            Command::AppendFile => {
                let name_len = be(body, 0)? as usize;
                let data_len = be(body, 8)? as usize;
                let path = bytes_str(body.get(16..16 + name_len).ok_or(())?);
                let data = body.get(16 + name_len..16 + name_len + data_len).ok_or(())?;
                let mut state = self.state.lock().unwrap();
                match state.files.get_mut(&path) {
                    Some(file) if file.appender => {
                        file.data.extend_from_slice(data);
                        Ok((0, Vec::new()))
                    }
                    Some(_) => Ok((22, Vec::new())),
                    None => Ok((2, Vec::new())),
                }
            }
            Command::ModifyFile => {
                let name_len = be(body, 0)? as usize;
                let offset = be(body, 8)? as usize;
                let data_len = be(body, 16)? as usize;
                let path = bytes_str(body.get(24..24 + name_len).ok_or(())?);
                let data = body.get(24 + name_len..24 + name_len + data_len).ok_or(())?;
                let mut state = self.state.lock().unwrap();
                match state.files.get_mut(&path) {
                    Some(file) if file.appender && offset <= file.data.len() => {
                        let end = offset + data.len();
                        if end > file.data.len() {
                            file.data.resize(end, 0);
                        }
                        file.data[offset..end].copy_from_slice(data);
                        Ok((0, Vec::new()))
                    }
                    Some(_) => Ok((22, Vec::new())),
                    None => Ok((2, Vec::new())),
                }
            }
            Command::ListOneGroup => {
                let group = fixed(body.get(..GROUP_NAME_LEN).ok_or(())?);
                if group != DEFAULT_GROUP {
                    return Ok((2, Vec::new()));
                }
                Ok((0, self.group_stat()))
            }
            Command::ListAllGroups => Ok((0, self.group_stat())),
            Command::ListStorage => {
                let group = fixed(body.get(..GROUP_NAME_LEN).ok_or(())?);
                let ip = bytes_str(&body[GROUP_NAME_LEN..]);
                if group != DEFAULT_GROUP || !(ip.is_empty() || ip == STORAGE_IP) {
                    return Ok((2, Vec::new()));
                }
                Ok((0, self.storage_stat()))
            }
            Command::TruncateFile => {
                let name_len = be(body, 0)? as usize;
                let size = be(body, 8)? as usize;
                let path = bytes_str(body.get(16..16 + name_len).ok_or(())?);
                let mut state = self.state.lock().unwrap();
                match state.files.get_mut(&path) {
                    Some(file) if file.appender => {
                        file.data.resize(size, 0);
                        Ok((0, Vec::new()))
                    }
                    Some(_) => Ok((22, Vec::new())),
                    None => Ok((2, Vec::new())),
                }
            }
            Command::ActiveTest => Ok((0, Vec::new())),
            Command::Response => Err(()),
        }
    }

    /// Never answers. A read returning 0 or a reset means the client closed
    /// its end; running out the clock does not count.
    fn stall(&self, stream: &mut TcpStream) {
        if stream.set_read_timeout(Some(Duration::from_secs(5))).is_err() {
            return;
        }
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return
                }
                Err(_) => break,
            }
        }
        self.hangups.fetch_add(1, Ordering::SeqCst);
    }

    fn store_endpoint(&self, group: &str) -> Vec<u8> {
        let mut reply = pad(group, GROUP_NAME_LEN);
        reply.extend(pad(STORAGE_IP, IP_ADDRESS_LEN));
        reply.extend((self.port as u64).to_be_bytes());
        reply.push(0);
        reply
    }

    fn group_stat(&self) -> Vec<u8> {
        let mut record = pad(DEFAULT_GROUP, GROUP_NAME_LEN + 1);
        let port = self.port as u64;
        for value in [CAPACITY_MB, CAPACITY_MB, 0, 1, port, 0, 1, 0, 1, 256, 0] {
            record.extend(value.to_be_bytes());
        }
        record
    }

    fn storage_stat(&self) -> Vec<u8> {
        let (uploads, downloads) = {
            let state = self.state.lock().unwrap();
            (state.uploads, state.downloads)
        };
        let mut record = vec![STORAGE_STATUS_ACTIVE];
        record.extend(pad(STORAGE_IP, STORAGE_ID_LEN));
        record.extend(pad(STORAGE_IP, SOURCE_IP_LEN));
        record.extend(pad("", DOMAIN_NAME_LEN));
        record.extend(pad("", STORAGE_ID_LEN));
        record.extend(pad("6.12", VERSION_LEN));
        let port = self.port as u64;
        for value in [HEART_BEAT, HEART_BEAT, CAPACITY_MB, CAPACITY_MB, 0, 1, 256, 0, port, 0] {
            record.extend(value.to_be_bytes());
        }
        let mut counters = [0u64; STORAGE_STAT_COUNTERS];
        counters[0] = uploads;
        counters[1] = uploads;
        counters[12] = downloads;
        counters[13] = downloads;
        counters[STORAGE_STAT_COUNTERS - 1] = HEART_BEAT;
        for value in counters {
            record.extend(value.to_be_bytes());
        }
        record.push(0);
        record
    }

    /// Names the slave after its master: `abc.jpg` + `_s` -> `abc_s.jpg`.
    fn upload_slave(&self, body: &[u8]) -> Result<(u8, Vec<u8>), ()> {
        let master_len = be(body, 0)? as usize;
        let size = be(body, 8)? as usize;
        let fixed_end = 16 + PREFIX_NAME_LEN + EXT_NAME_LEN;
        let prefix = fixed(body.get(16..16 + PREFIX_NAME_LEN).ok_or(())?);
        let ext = fixed(body.get(16 + PREFIX_NAME_LEN..fixed_end).ok_or(())?);
        let master = bytes_str(body.get(fixed_end..fixed_end + master_len).ok_or(())?);
        let data = body.get(fixed_end + master_len..).ok_or(())?;
        if data.len() != size {
            return Err(());
        }

        let mut state = self.state.lock().unwrap();
        let Some(master_file) = state.files.get(&master) else {
            return Ok((2, Vec::new()));
        };
        let group = master_file.group.clone();
        let (stem, master_ext) = master.rsplit_once('.').unwrap_or((master.as_str(), ""));
        let ext = if ext.is_empty() { master_ext.to_string() } else { ext };
        let path = if ext.is_empty() {
            format!("{}{}", stem, prefix)
        } else {
            format!("{}{}.{}", stem, prefix, ext)
        };
        if state.files.contains_key(&path) {
            return Ok((17, Vec::new()));
        }
        state.files.insert(
            path.clone(),
            StoredFile {
                group: group.clone(),
                data: data.to_vec(),
                metadata: Metadata::new(),
                created: now(),
                appender: false,
            },
        );
        state.uploads += 1;

        let mut reply = pad(&group, GROUP_NAME_LEN);
        reply.extend_from_slice(path.as_bytes());
        Ok((0, reply))
    }

    fn upload(&self, body: &[u8], appender: bool) -> Result<(u8, Vec<u8>), ()> {
        let size = be(body, 1)? as usize;
        let ext = fixed(body.get(9..15).ok_or(())?);
        let data = body.get(15..).ok_or(())?;
        if data.len() != size {
            return Err(());
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = if ext.is_empty() {
            format!("M00/00/00/{:016x}", id)
        } else {
            format!("M00/00/00/{:016x}.{}", id, ext)
        };
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            path.clone(),
            StoredFile {
                group: DEFAULT_GROUP.to_string(),
                data: data.to_vec(),
                metadata: Metadata::new(),
                created: now(),
                appender,
            },
        );
        state.uploads += 1;

        let mut reply = pad(DEFAULT_GROUP, GROUP_NAME_LEN);
        reply.extend_from_slice(path.as_bytes());
        Ok((0, reply))
    }

    fn download(&self, body: &[u8]) -> Result<(u8, Vec<u8>), ()> {
        let offset = be(body, 0)? as usize;
        let length = be(body, 8)? as usize;
        let (_, path) = split_file_id(body.get(16..).ok_or(())?)?;
        let mut state = self.state.lock().unwrap();
        let Some(file) = state.files.get(&path) else {
            return Ok((2, Vec::new()));
        };
        let start = offset.min(file.data.len());
        let end = if length == 0 {
            file.data.len()
        } else {
            (start + length).min(file.data.len())
        };
        let content = file.data[start..end].to_vec();
        state.downloads += 1;
        Ok((0, content))
    }
}

/// Accepts one connection, reads one request, writes `reply` verbatim, closes.
pub fn serve_raw_once(reply: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind raw server");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = read_request(&mut stream);
            let _ = stream.write_all(&reply);
        }
    });
    addr
}

/// Accepts connections and reads requests but never answers.
pub fn serve_silent(hold: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent server");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let _ = read_request(&mut stream);
                thread::sleep(hold);
            });
        }
    });
    addr
}

/// A port nothing listens on.
pub fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}

fn read_request(stream: &mut TcpStream) -> Option<(Header, Vec<u8>)> {
    let mut head = [0u8; Header::SIZE];
    stream.read_exact(&mut head).ok()?;
    let header = Header::decode(&head).ok()?;
    let mut body = vec![0u8; header.length as usize];
    stream.read_exact(&mut body).ok()?;
    Some((header, body))
}

fn respond(stream: &mut TcpStream, status: u8, body: &[u8]) -> std::io::Result<()> {
    let mut header = Header::new(body.len() as u64, Command::Response);
    header.status = status;
    let mut frame = header.encode().to_vec();
    frame.extend_from_slice(body);
    stream.write_all(&frame)?;
    stream.flush()
}

fn split_file_id(body: &[u8]) -> Result<(String, String), ()> {
    let group = fixed(body.get(..GROUP_NAME_LEN).ok_or(())?);
    let path = bytes_str(&body[GROUP_NAME_LEN..]);
    if path.is_empty() {
        return Err(());
    }
    Ok((group, path))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn be(body: &[u8], at: usize) -> Result<u64, ()> {
    let raw = body.get(at..at + 8).ok_or(())?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_be_bytes(buf))
}

fn pad(value: &str, width: usize) -> Vec<u8> {
    let mut out = value.as_bytes().to_vec();
    out.resize(width, 0);
    out
}

fn fixed(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    bytes_str(&raw[..end])
}

fn bytes_str(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
