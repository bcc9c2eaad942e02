#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use byteorder::{LittleEndian, WriteBytesExt};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use odalpapi::protocol::codec::{make_version, MASTER_CHALLENGE, PING_CHALLENGE, SERVER_CHALLENGE};
use odalpapi::ServerAddress;

pub const HEADER: u32 = 0xAD03_2000;
pub const CLIENT_VERSION: u32 = make_version(10, 4, 0);

pub fn address_of(addr: SocketAddr) -> ServerAddress {
    ServerAddress::new(addr.ip().to_string(), addr.port())
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// A deathmatch reply with `players` active players and DOOM2 loaded.
pub fn game_reply(name: &str, players: usize, version: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(HEADER).unwrap();
    buf.write_u32::<LittleEndian>(version).unwrap();
    buf.write_u32::<LittleEndian>(7).unwrap();
    buf.write_u32::<LittleEndian>(3).unwrap();
    buf.write_u32::<LittleEndian>(7).unwrap();
    put_string(&mut buf, "10.4.0");

    buf.push(4);
    put_string(&mut buf, "sv_hostname");
    buf.push(6);
    put_string(&mut buf, name);
    put_string(&mut buf, "sv_maxplayers");
    buf.push(2);
    buf.push(16);
    put_string(&mut buf, "sv_maxclients");
    buf.push(2);
    buf.push(16);
    put_string(&mut buf, "sv_gametype");
    buf.push(2);
    buf.push(1);

    buf.push(0); // no password
    put_string(&mut buf, "MAP01");
    buf.push(0); // patches
    buf.push(2);
    put_string(&mut buf, "odamex.wad");
    buf.push(0);
    put_string(&mut buf, "doom2.wad");
    buf.push(16);
    buf.extend_from_slice(&[0x5A; 16]);

    buf.push(players as u8);
    for i in 0..players {
        put_string(&mut buf, &format!("player{}", i));
        buf.write_u32::<LittleEndian>(0x00FF_FFFF).unwrap();
        buf.write_u16::<LittleEndian>(20).unwrap();
        buf.write_u16::<LittleEndian>(300).unwrap();
        buf.push(0);
        buf.write_u16::<LittleEndian>(5).unwrap();
        buf.write_u16::<LittleEndian>(6).unwrap();
        buf.write_u16::<LittleEndian>(1).unwrap();
    }
    buf
}

pub fn master_reply(servers: &[SocketAddr]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(MASTER_CHALLENGE).unwrap();
    buf.write_u16::<LittleEndian>(servers.len() as u16).unwrap();
    for server in servers {
        match server.ip() {
            std::net::IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
            std::net::IpAddr::V6(_) => panic!("test servers are IPv4"),
        }
        buf.write_u16::<LittleEndian>(server.port()).unwrap();
    }
    buf
}

pub enum Behaviour {
    /// Reply to server challenges with these bytes, echo pings.
    Reply(Vec<u8>),
    /// Reply twice to every challenge.
    ReplyTwice(Vec<u8>),
    /// Receive and never answer.
    Silent,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub fn address(&self) -> ServerAddress {
        address_of(self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server(behaviour: Behaviour) -> FakeServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else { continue };
            counter.fetch_add(1, Ordering::SeqCst);
            if len < 4 {
                continue;
            }
            let token = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            let reply = match (&behaviour, token) {
                (Behaviour::Silent, _) => continue,
                (_, PING_CHALLENGE) => vec![0u8; 4],
                (Behaviour::Reply(bytes), SERVER_CHALLENGE) => bytes.clone(),
                (Behaviour::ReplyTwice(bytes), SERVER_CHALLENGE) => {
                    let _ = socket.send_to(bytes, from).await;
                    bytes.clone()
                }
                _ => continue,
            };
            let _ = socket.send_to(&reply, from).await;
        }
    });

    FakeServer { addr, hits, handle }
}

pub async fn spawn_master(servers: Vec<SocketAddr>) -> FakeServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let reply = master_reply(&servers);

    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else { continue };
            counter.fetch_add(1, Ordering::SeqCst);
            if len == 4 && u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) == MASTER_CHALLENGE {
                let _ = socket.send_to(&reply, from).await;
            }
        }
    });

    FakeServer { addr, hits, handle }
}

/// A loopback port with nothing bound to it (best effort).
pub async fn closed_port() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    drop(socket);
    tokio::time::sleep(Duration::from_millis(5)).await;
    addr
}
