use crate::codec;
use crate::config::PeerConfig;
use crate::proto::{ec, id, NotifyAddFriendReq, NotifyAuthFriendReq, NotifyTextChatReq};
use crate::rpc::pool::StubPool;
use anyhow::anyhow;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const POOL_SIZE: usize = 5;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A lazily connected unary client. One request, one reply; a broken
/// pooled connection is replaced once before the call fails.
pub struct RpcStub {
    addr: String,
    conn: Option<TcpStream>,
}

impl RpcStub {
    pub fn new(addr: String) -> Self {
        Self { addr, conn: None }
    }

    fn connect(addr: &str) -> anyhow::Result<TcpStream> {
        let target = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow!("cannot resolve {}", addr))?;
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(stream)
    }

    pub fn call(&mut self, method: u16, req: &impl Serialize) -> anyhow::Result<serde_json::Value> {
        let payload = serde_json::to_vec(req)?;
        anyhow::ensure!(
            payload.len() <= codec::MAX_PAYLOAD,
            "rpc payload of {} bytes exceeds the frame bound",
            payload.len()
        );
        let frame = codec::encode(method, &payload);
        let mut stream = match self.conn.take() {
            Some(stream) => stream,
            None => Self::connect(&self.addr)?,
        };
        match Self::roundtrip(&mut stream, &frame) {
            Ok(reply) => {
                self.conn = Some(stream);
                Ok(reply)
            }
            Err(e) => {
                log::debug!("pooled connection to {} is stale, {:?}", self.addr, e);
                let mut stream = Self::connect(&self.addr)?;
                let reply = Self::roundtrip(&mut stream, &frame)?;
                self.conn = Some(stream);
                Ok(reply)
            }
        }
    }

    fn roundtrip(stream: &mut TcpStream, frame: &[u8]) -> anyhow::Result<serde_json::Value> {
        stream.write_all(frame)?;
        let mut head = [0_u8; codec::HEADER_LEN];
        stream.read_exact(&mut head)?;
        let (_, len) = codec::decode_header(head)?;
        anyhow::ensure!(len > 0, "empty rpc reply");
        let mut body = vec![0_u8; len as usize];
        stream.read_exact(&mut body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// One bounded stub pool per configured peer, keyed by node name.
pub struct PeerClients {
    pools: HashMap<String, StubPool>,
}

impl PeerClients {
    pub fn build(peers: &[PeerConfig]) -> Self {
        let mut pools = HashMap::new();
        for peer in peers {
            let stubs = (0..POOL_SIZE)
                .map(|_| RpcStub::new(peer.rpc_addr()))
                .collect();
            pools.insert(peer.name.clone(), StubPool::new(stubs));
            log::info!("peer {} registered at {}", peer.name, peer.rpc_addr());
        }
        Self { pools }
    }

    pub fn close_all(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
    }

    pub fn notify_add_friend(&self, node: &str, req: &NotifyAddFriendReq) -> u32 {
        self.call(node, id::RPC_NOTIFY_ADD_FRIEND, req)
    }

    pub fn notify_auth_friend(&self, node: &str, req: &NotifyAuthFriendReq) -> u32 {
        self.call(node, id::RPC_NOTIFY_AUTH_FRIEND, req)
    }

    pub fn notify_text_chat(&self, node: &str, req: &NotifyTextChatReq) -> u32 {
        self.call(node, id::RPC_NOTIFY_TEXT_CHAT_MSG, req)
    }

    fn call(&self, node: &str, method: u16, req: &impl Serialize) -> u32 {
        let pool = match self.pools.get(node) {
            Some(pool) => pool,
            None => {
                // presence can name a node this one was never configured
                // with; the notification is fire-and-forget either way
                log::warn!("no rpc pool for node {}, dropping notification", node);
                return ec::SUCCESS;
            }
        };
        let mut stub = match pool.acquire() {
            Some(stub) => stub,
            None => return ec::RPC_FAILED,
        };
        let result = stub.call(method, req);
        pool.release(stub);
        match result {
            Ok(reply) => reply
                .get("error")
                .and_then(|e| e.as_u64())
                .map(|e| e as u32)
                .unwrap_or(ec::RPC_FAILED),
            Err(e) => {
                log::error!("rpc {} to {} failed, {:?}", method, node, e);
                ec::RPC_FAILED
            }
        }
    }
}
