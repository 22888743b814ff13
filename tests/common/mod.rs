//! Scripted single-connection MQTT 3.1.1 broker for integration tests
//!
//! Accepts one client on an ephemeral port and answers with raw packets
//! according to a [`Script`]. Runs on a plain thread so it works under both
//! `#[test]` and `#[tokio::test]`.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

/// How the broker answers
#[derive(Debug, Clone)]
pub enum Script {
    /// CONNACK with a non-zero return code
    Refuse(u8),
    /// Accept and acknowledge publishes, shifting the PUBACK id by `offset`
    AckPublish { offset: u16 },
    /// Accept, then deliver one QoS 0 message after the SUBACK
    DeliverOnSubscribe { topic: String, payload: String },
    /// Accept, then reject every subscription in the SUBACK
    RejectSubscribe,
    /// Accept, send the SUBACK, then drop the connection
    CloseAfterSubscribe,
}

/// Broker-side observations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connect,
    Publish { topic: String, payload: Vec<u8> },
    Subscribe { topic: String },
    Disconnect,
    Closed,
}

pub struct ScriptedBroker {
    pub port: u16,
    events: mpsc::Receiver<Seen>,
}

impl ScriptedBroker {
    pub fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        let (tx, events) = mpsc::channel();

        // the serving thread ends when the client closes the socket
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve(stream, &script, &tx);
            }
        });

        Self { port, events }
    }

    /// Next observation, or `None` after `timeout`
    pub fn next_event(&self, timeout: Duration) -> Option<Seen> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Wait until an observation matching `predicate` arrives
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&Seen) -> bool) -> Option<Seen> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            match self.events.recv_timeout(remaining) {
                Ok(seen) if predicate(&seen) => return Some(seen),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

fn serve(mut stream: TcpStream, script: &Script, tx: &mpsc::Sender<Seen>) {
    stream
        .set_read_timeout(Some(Duration::from_secs(15)))
        .expect("set read timeout");

    while let Some((header, body)) = read_packet(&mut stream) {
        let kind = header >> 4;
        let reply = match kind {
            CONNECT => {
                let _ = tx.send(Seen::Connect);
                let code = match script {
                    Script::Refuse(code) => *code,
                    _ => 0,
                };
                Some(vec![0x20, 0x02, 0x00, code])
            }
            PUBLISH => {
                let qos = (header >> 1) & 0x03;
                let (topic, rest) = split_topic(&body);
                let (pkid, payload) = if qos > 0 {
                    (u16::from_be_bytes([rest[0], rest[1]]), rest[2..].to_vec())
                } else {
                    (0, rest.to_vec())
                };
                let _ = tx.send(Seen::Publish { topic, payload });
                match script {
                    Script::AckPublish { offset } if qos > 0 => {
                        let [hi, lo] = pkid.wrapping_add(*offset).to_be_bytes();
                        Some(vec![0x40, 0x02, hi, lo])
                    }
                    _ => None,
                }
            }
            SUBSCRIBE => {
                let (hi, lo) = (body[0], body[1]);
                let (topic, _) = split_topic(&body[2..]);
                let _ = tx.send(Seen::Subscribe { topic });
                if let Script::CloseAfterSubscribe = script {
                    let _ = stream.write_all(&[0x90, 0x03, hi, lo, 0x00]);
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                    break;
                }
                match script {
                    Script::RejectSubscribe => Some(vec![0x90, 0x03, hi, lo, 0x80]),
                    Script::DeliverOnSubscribe { topic, payload } => {
                        let mut reply = vec![0x90, 0x03, hi, lo, 0x00];
                        reply.extend(qos0_publish(topic, payload.as_bytes()));
                        Some(reply)
                    }
                    _ => Some(vec![0x90, 0x03, hi, lo, 0x00]),
                }
            }
            PINGREQ => Some(vec![0xD0, 0x00]),
            DISCONNECT => {
                let _ = tx.send(Seen::Disconnect);
                return;
            }
            _ => None,
        };

        if let Some(bytes) = reply {
            if stream.write_all(&bytes).is_err() {
                break;
            }
        }
    }

    let _ = tx.send(Seen::Closed);
}

fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 1];
    stream.read_exact(&mut header).ok()?;

    let mut remaining = 0usize;
    let mut multiplier = 1usize;
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).ok()?;
        remaining += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
    }

    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).ok()?;
    Some((header[0], body))
}

fn split_topic(body: &[u8]) -> (String, &[u8]) {
    let len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic = String::from_utf8_lossy(&body[2..2 + len]).into_owned();
    (topic, &body[2 + len..])
}

fn qos0_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128, "test payloads fit a one-byte length");
    let mut packet = vec![0x30, remaining as u8];
    packet.extend((topic.len() as u16).to_be_bytes());
    packet.extend(topic.as_bytes());
    packet.extend(payload);
    packet
}

/// Wait for `child` to exit, killing it and panicking after `timeout`
pub fn wait_with_timeout(mut child: std::process::Child, timeout: Duration) -> std::process::Output {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait().expect("poll child") {
            Some(_) => return child.wait_with_output().expect("collect output"),
            None if std::time::Instant::now() >= deadline => {
                let _ = child.kill();
                let output = child.wait_with_output().expect("collect output");
                panic!(
                    "process did not exit within {timeout:?}\nstdout: {}\nstderr: {}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    }
}
