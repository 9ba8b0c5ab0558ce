use bytes::Bytes;
use skiff_core::buffer::ReadBuffer;
use skiff_core::error::ProtocolError;
use skiff_core::message::Message;
use skiff_core::options::DEFAULT_MAX_PAYLOAD;
use std::marker::PhantomData;

use crate::command::{lookup, Direction, Fields, Verb};
use crate::info::{ConnectInfo, ServerInfo};

const CRLF: &[u8] = b"\r\n";

/// Frames a broker sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOp {
    Info(Box<ServerInfo>),
    Msg(Message),
    Ping,
    Pong,
    Ok,
    Err(String),
}

/// Frames a client sends to a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOp {
    Connect(Box<ConnectInfo>),
    Pub {
        subject: String,
        reply: Option<String>,
        payload: Bytes,
    },
    Sub {
        subject: String,
        queue: Option<String>,
        sid: u64,
    },
    Unsub {
        sid: u64,
        max_msgs: Option<u64>,
    },
    Ping,
    Pong,
}

impl ServerOp {
    pub const fn verb(&self) -> Verb {
        match self {
            Self::Info(_) => Verb::Info,
            Self::Msg(_) => Verb::Msg,
            Self::Ping => Verb::Ping,
            Self::Pong => Verb::Pong,
            Self::Ok => Verb::Ok,
            Self::Err(_) => Verb::Err,
        }
    }
}

impl ClientOp {
    pub const fn verb(&self) -> Verb {
        match self {
            Self::Connect(_) => Verb::Connect,
            Self::Pub { .. } => Verb::Pub,
            Self::Sub { .. } => Verb::Sub,
            Self::Unsub { .. } => Verb::Unsub,
            Self::Ping => Verb::Ping,
            Self::Pong => Verb::Pong,
        }
    }
}

/// Control line of a data frame, parsed before its payload is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHeader {
    pub verb: Verb,
    pub subject: String,
    pub sid: Option<u64>,
    pub reply: Option<String>,
    pub size: usize,
}

impl DataHeader {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            verb: fields.descriptor().verb,
            subject: fields.require("subject")?.to_string(),
            sid: fields.parse_opt("sid")?,
            reply: fields.get("reply").map(str::to_string),
            size: fields.parse("size")?,
        })
    }
}

/// One side of the protocol: which verbs it receives and how they are built.
pub trait Operation: Sized {
    /// The peer that receives these operations.
    const RECEIVER: Direction;

    /// Build a frame that has no payload.
    fn control(fields: &Fields<'_>) -> Result<Self, ProtocolError>;

    /// Build a data frame once its payload is complete.
    fn data(header: DataHeader, payload: Bytes) -> Result<Self, ProtocolError>;

    /// Append the wire encoding of this frame to `dst`.
    fn encode(&self, dst: &mut Vec<u8>);
}

fn put_line(dst: &mut Vec<u8>, parts: &[&str]) {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            dst.push(b' ');
        }
        dst.extend_from_slice(part.as_bytes());
    }
    dst.extend_from_slice(CRLF);
}

fn put_payload(dst: &mut Vec<u8>, payload: &[u8]) {
    dst.extend_from_slice(payload);
    dst.extend_from_slice(CRLF);
}

fn put_json<T: serde::Serialize>(dst: &mut Vec<u8>, verb: &str, doc: &T) {
    dst.extend_from_slice(verb.as_bytes());
    dst.push(b' ');
    serde_json::to_writer(&mut *dst, doc).expect("handshake documents always serialize");
    dst.extend_from_slice(CRLF);
}

fn parse_json<T: serde::de::DeserializeOwned>(fields: &Fields<'_>) -> Result<T, ProtocolError> {
    serde_json::from_str(fields.rest()).map_err(|e| {
        ProtocolError::malformed(fields.descriptor().name, format!("invalid JSON: {e}"))
    })
}

impl Operation for ServerOp {
    const RECEIVER: Direction = Direction::ToClient;

    fn control(fields: &Fields<'_>) -> Result<Self, ProtocolError> {
        match fields.descriptor().verb {
            Verb::Info => Ok(Self::Info(Box::new(parse_json(fields)?))),
            Verb::Ping => Ok(Self::Ping),
            Verb::Pong => Ok(Self::Pong),
            Verb::Ok => Ok(Self::Ok),
            Verb::Err => Ok(Self::Err(fields.rest().trim_matches('\'').to_string())),
            _ => Err(ProtocolError::unexpected(fields.descriptor().name)),
        }
    }

    fn data(header: DataHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        let sid = header
            .sid
            .ok_or_else(|| ProtocolError::malformed(header.verb.name(), "missing sid"))?;
        Ok(Self::Msg(Message {
            sid,
            subject: header.subject,
            reply: header.reply,
            size: header.size,
            payload,
        }))
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        match self {
            Self::Info(info) => put_json(dst, "INFO", info),
            Self::Msg(msg) => {
                let sid = msg.sid.to_string();
                let size = msg.payload.len().to_string();
                match &msg.reply {
                    Some(reply) => put_line(dst, &["MSG", &msg.subject, &sid, reply, &size]),
                    None => put_line(dst, &["MSG", &msg.subject, &sid, &size]),
                }
                put_payload(dst, &msg.payload);
            }
            Self::Ping => put_line(dst, &["PING"]),
            Self::Pong => put_line(dst, &["PONG"]),
            Self::Ok => put_line(dst, &["+OK"]),
            Self::Err(text) => put_line(dst, &["-ERR", &format!("'{text}'")]),
        }
    }
}

impl Operation for ClientOp {
    const RECEIVER: Direction = Direction::ToBroker;

    fn control(fields: &Fields<'_>) -> Result<Self, ProtocolError> {
        match fields.descriptor().verb {
            Verb::Connect => Ok(Self::Connect(Box::new(parse_json(fields)?))),
            Verb::Sub => Ok(Self::Sub {
                subject: fields.require("subject")?.to_string(),
                queue: fields.get("queue").map(str::to_string),
                sid: fields.parse("sid")?,
            }),
            Verb::Unsub => Ok(Self::Unsub {
                sid: fields.parse("sid")?,
                max_msgs: fields.parse_opt("max_msgs")?,
            }),
            Verb::Ping => Ok(Self::Ping),
            Verb::Pong => Ok(Self::Pong),
            _ => Err(ProtocolError::unexpected(fields.descriptor().name)),
        }
    }

    fn data(header: DataHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self::Pub {
            subject: header.subject,
            reply: header.reply,
            payload,
        })
    }

    fn encode(&self, dst: &mut Vec<u8>) {
        match self {
            Self::Connect(info) => put_json(dst, "CONNECT", info),
            Self::Pub {
                subject,
                reply,
                payload,
            } => {
                // Byte count always comes from the payload itself.
                let size = payload.len().to_string();
                match reply {
                    Some(reply) => put_line(dst, &["PUB", subject, reply, &size]),
                    None => put_line(dst, &["PUB", subject, &size]),
                }
                put_payload(dst, payload);
            }
            Self::Sub { subject, queue, sid } => {
                let queue = queue.as_deref().unwrap_or("");
                put_line(dst, &["SUB", subject, queue, &sid.to_string()]);
            }
            Self::Unsub { sid, max_msgs } => match max_msgs {
                Some(max) => put_line(dst, &["UNSUB", &sid.to_string(), &max.to_string()]),
                None => put_line(dst, &["UNSUB", &sid.to_string()]),
            },
            Self::Ping => put_line(dst, &["PING"]),
            Self::Pong => put_line(dst, &["PONG"]),
        }
    }
}

/// Stateful frame decoder
///
/// Pulls complete frames out of a [`ReadBuffer`]. A data frame's control
/// line is validated before any payload byte is touched; until the full
/// payload plus CRLF is buffered the parsed header is kept here and the
/// payload stays in the buffer. A header announcing more than `max_payload`
/// bytes is rejected before anything is buffered for it.
pub struct Decoder<Op> {
    pending: Option<DataHeader>,
    max_control_line: usize,
    max_payload: usize,
    _op: PhantomData<fn() -> Op>,
}

impl<Op: Operation> Decoder<Op> {
    #[must_use]
    pub fn new(max_control_line: usize) -> Self {
        Self {
            pending: None,
            max_control_line,
            max_payload: DEFAULT_MAX_PAYLOAD,
            _op: PhantomData,
        }
    }

    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Change the payload limit, e.g. once the broker's INFO is known.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    #[inline]
    pub const fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Forget a half-received data frame.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Decode a single frame from `src`
    ///
    /// Returns:
    /// - Ok(Some(op)) → frame decoded
    /// - Ok(None) → need more data
    /// - Err → protocol violation
    pub fn decode(&mut self, src: &mut ReadBuffer) -> Result<Option<Op>, ProtocolError> {
        if let Some(header) = self.pending.take() {
            return self.decode_payload(header, src);
        }

        let Some(end) = src.find_crlf() else {
            if src.len() > self.max_control_line {
                return Err(ProtocolError::unexpected(format!(
                    "control line exceeds {} bytes",
                    self.max_control_line
                )));
            }
            return Ok(None);
        };

        let line = src.take_bytes(end).unwrap_or_default();
        src.advance(2);

        if line.len() > self.max_control_line {
            return Err(ProtocolError::unexpected(format!(
                "control line exceeds {} bytes",
                self.max_control_line
            )));
        }

        let text = std::str::from_utf8(&line)
            .map_err(|_| ProtocolError::unexpected(String::from_utf8_lossy(&line)))?;
        let (name, args) = text
            .split_once(|c: char| c == ' ' || c == '\t')
            .unwrap_or((text, ""));

        let desc = lookup(name)
            .filter(|d| d.accepted_by(Op::RECEIVER))
            .ok_or_else(|| ProtocolError::unexpected(text))?;
        let fields = Fields::resolve(desc, args)?;

        if desc.payload {
            let header = DataHeader::from_fields(&fields)?;
            if header.size > self.max_payload {
                return Err(ProtocolError::malformed(
                    header.verb.name(),
                    format!(
                        "payload of {} bytes exceeds limit of {}",
                        header.size, self.max_payload
                    ),
                ));
            }
            return self.decode_payload(header, src);
        }
        Op::control(&fields).map(Some)
    }

    fn decode_payload(
        &mut self,
        header: DataHeader,
        src: &mut ReadBuffer,
    ) -> Result<Option<Op>, ProtocolError> {
        match src.has_crlf_at(header.size) {
            None => {
                self.pending = Some(header);
                Ok(None)
            }
            Some(false) => Err(ProtocolError::malformed(
                header.verb.name(),
                format!("payload of {} bytes not followed by CRLF", header.size),
            )),
            Some(true) => {
                let payload = src.take_bytes(header.size).unwrap_or_default();
                src.advance(2);
                Op::data(header, payload).map(Some)
            }
        }
    }
}
