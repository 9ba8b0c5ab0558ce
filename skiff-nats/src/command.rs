//! The NATS command table.
//!
//! Every protocol verb is described once, as data: its wire name, which side
//! may send it, how its arguments are laid out and whether a payload follows
//! the control line. The codec consults this table to split a control line
//! into named fields before building the typed operation.

use skiff_core::error::ProtocolError;
use smallvec::SmallVec;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Connect,
    Info,
    Ping,
    Pong,
    Sub,
    Unsub,
    Pub,
    Msg,
    Ok,
    Err,
}

/// Which peer is allowed to send a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client → broker
    ToBroker,
    /// broker → client
    ToClient,
    /// either side
    Both,
}

/// One positional field of a control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub optional: bool,
}

const fn req(name: &'static str) -> Field {
    Field {
        name,
        optional: false,
    }
}

const fn opt(name: &'static str) -> Field {
    Field {
        name,
        optional: true,
    }
}

/// Argument layout of a control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Args {
    /// Verb stands alone (`PING`, `+OK`)
    None,
    /// Everything after the verb is one opaque argument (`INFO {json}`)
    Rest,
    /// Whitespace-separated fields; at most one may be optional
    Fields(&'static [Field]),
}

/// Line-matching rule for one verb.
#[derive(Debug)]
pub struct CommandDescriptor {
    pub verb: Verb,
    pub name: &'static str,
    pub direction: Direction,
    pub args: Args,
    /// A `<size>`-byte payload plus CRLF follows the control line
    pub payload: bool,
}

pub static COMMANDS: [CommandDescriptor; 10] = [
    CommandDescriptor {
        verb: Verb::Connect,
        name: "CONNECT",
        direction: Direction::ToBroker,
        args: Args::Rest,
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Info,
        name: "INFO",
        direction: Direction::ToClient,
        args: Args::Rest,
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Ping,
        name: "PING",
        direction: Direction::Both,
        args: Args::None,
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Pong,
        name: "PONG",
        direction: Direction::Both,
        args: Args::None,
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Sub,
        name: "SUB",
        direction: Direction::ToBroker,
        args: Args::Fields(&[req("subject"), opt("queue"), req("sid")]),
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Unsub,
        name: "UNSUB",
        direction: Direction::ToBroker,
        args: Args::Fields(&[req("sid"), opt("max_msgs")]),
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Pub,
        name: "PUB",
        direction: Direction::ToBroker,
        args: Args::Fields(&[req("subject"), opt("reply"), req("size")]),
        payload: true,
    },
    CommandDescriptor {
        verb: Verb::Msg,
        name: "MSG",
        direction: Direction::ToClient,
        args: Args::Fields(&[req("subject"), req("sid"), opt("reply"), req("size")]),
        payload: true,
    },
    CommandDescriptor {
        verb: Verb::Ok,
        name: "+OK",
        direction: Direction::ToClient,
        args: Args::None,
        payload: false,
    },
    CommandDescriptor {
        verb: Verb::Err,
        name: "-ERR",
        direction: Direction::ToClient,
        args: Args::Rest,
        payload: false,
    },
];

/// Find the descriptor for a wire verb (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

impl Verb {
    pub fn descriptor(self) -> &'static CommandDescriptor {
        let idx = match self {
            Self::Connect => 0,
            Self::Info => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Sub => 4,
            Self::Unsub => 5,
            Self::Pub => 6,
            Self::Msg => 7,
            Self::Ok => 8,
            Self::Err => 9,
        };
        &COMMANDS[idx]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl CommandDescriptor {
    /// Whether a peer in `to` may receive this verb.
    pub fn accepted_by(&self, to: Direction) -> bool {
        self.direction == Direction::Both || self.direction == to
    }

    fn malformed(&self, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::malformed(self.name, reason)
    }
}

/// Named fields bound from one control line.
#[derive(Debug)]
pub struct Fields<'a> {
    desc: &'static CommandDescriptor,
    values: SmallVec<[(&'static str, &'a str); 4]>,
    rest: &'a str,
}

impl<'a> Fields<'a> {
    /// Bind the argument text of a control line to `desc`'s fields.
    ///
    /// Fields are separated by runs of ASCII whitespace, so `SUB foo  1`
    /// binds `subject=foo`, `sid=1` and leaves `queue` unset.
    pub fn resolve(desc: &'static CommandDescriptor, args: &'a str) -> Result<Self, ProtocolError> {
        let args = args.trim();
        let mut values = SmallVec::new();

        match desc.args {
            Args::None => {
                if !args.is_empty() {
                    return Err(desc.malformed(format!("unexpected arguments {args:?}")));
                }
            }
            Args::Rest => {
                if args.is_empty() && desc.verb != Verb::Err {
                    return Err(desc.malformed("missing argument"));
                }
            }
            Args::Fields(fields) => {
                let tokens: SmallVec<[&'a str; 5]> = args.split_ascii_whitespace().collect();
                let has_optional = fields.iter().any(|f| f.optional);
                let skip_optional = if tokens.len() == fields.len() {
                    false
                } else if has_optional && tokens.len() + 1 == fields.len() {
                    true
                } else {
                    let min = fields.len() - usize::from(has_optional);
                    return Err(desc.malformed(format!(
                        "expected {min}..={} fields, got {}",
                        fields.len(),
                        tokens.len()
                    )));
                };

                let bound = fields.iter().filter(|f| !(skip_optional && f.optional));
                values.extend(bound.map(|f| f.name).zip(tokens));
            }
        }

        Ok(Self {
            desc,
            values,
            rest: args,
        })
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.desc
    }

    /// Value of a named field, if present on the line.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    /// Value of a field the layout guarantees.
    pub fn require(&self, name: &str) -> Result<&'a str, ProtocolError> {
        self.get(name)
            .ok_or_else(|| self.desc.malformed(format!("missing field {name}")))
    }

    /// Parse a required field, e.g. a sid or size.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, ProtocolError> {
        let raw = self.require(name)?;
        raw.parse()
            .map_err(|_| self.desc.malformed(format!("invalid {name} {raw:?}")))
    }

    /// Parse an optional field.
    pub fn parse_opt<T: FromStr>(&self, name: &str) -> Result<Option<T>, ProtocolError> {
        match self.get(name) {
            Some(_) => self.parse(name).map(Some),
            None => Ok(None),
        }
    }

    /// The whole argument text, for `Args::Rest` verbs.
    pub fn rest(&self) -> &'a str {
        self.rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_consistent() {
        for desc in &COMMANDS {
            assert_eq!(desc.verb.descriptor().name, desc.name);
            if let Args::Fields(fields) = desc.args {
                assert!(fields.iter().filter(|f| f.optional).count() <= 1);
            }
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(lookup("msg").map(|d| d.verb), Some(Verb::Msg));
        assert_eq!(lookup("+ok").map(|d| d.verb), Some(Verb::Ok));
        assert!(lookup("HPUB").is_none());
    }

    #[test]
    fn test_sub_with_empty_queue() {
        let fields = Fields::resolve(Verb::Sub.descriptor(), "foo  1").unwrap();
        assert_eq!(fields.get("subject"), Some("foo"));
        assert_eq!(fields.get("queue"), None);
        assert_eq!(fields.parse::<u64>("sid").unwrap(), 1);
    }

    #[test]
    fn test_msg_optional_reply_binds_before_size() {
        let with_reply = Fields::resolve(Verb::Msg.descriptor(), "a.b 3 _INBOX.x 11").unwrap();
        assert_eq!(with_reply.get("reply"), Some("_INBOX.x"));
        assert_eq!(with_reply.parse::<usize>("size").unwrap(), 11);

        let without = Fields::resolve(Verb::Msg.descriptor(), "a.b 3 11").unwrap();
        assert_eq!(without.get("reply"), None);
        assert_eq!(without.parse::<u64>("sid").unwrap(), 3);
    }

    #[test]
    fn test_unsub_trailing_optional() {
        let fields = Fields::resolve(Verb::Unsub.descriptor(), "7 10").unwrap();
        assert_eq!(fields.parse::<u64>("sid").unwrap(), 7);
        assert_eq!(fields.parse_opt::<u64>("max_msgs").unwrap(), Some(10));
    }

    #[test]
    fn test_wrong_arity_is_malformed() {
        let err = Fields::resolve(Verb::Msg.descriptor(), "only.subject").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { verb: "MSG", .. }));

        let err = Fields::resolve(Verb::Ping.descriptor(), "extra").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { verb: "PING", .. }));
    }

    #[test]
    fn test_non_numeric_field() {
        let fields = Fields::resolve(Verb::Msg.descriptor(), "foo 1 abc").unwrap();
        let err = fields.parse::<usize>("size").unwrap_err();
        assert_eq!(err, ProtocolError::malformed("MSG", "invalid size \"abc\""));
    }
}
