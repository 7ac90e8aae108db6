//! Text command grammar.
//!
//! A command is one line of whitespace-separated tokens. Arity (and the
//! integer form of `EXPIRE`'s seconds) is checked here; ZADD scores and
//! ZRANGE bounds stay textual until the dispatcher parses them.

pub const WITHSCORES: &str = "WITHSCORES";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: String },
    Expire { key: String, seconds: i64 },
    ZAdd { key: String, pairs: Vec<(String, String)> },
    ZRank { key: String, member: String },
    ZRange { key: String, start: String, end: String, with_scores: bool },
}

impl Command {
    /// Classifies a raw command line, or returns `None` if it does not match
    /// any known form.
    pub fn parse(line: &str) -> Option<Command> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (&verb, rest) = tokens.split_first()?;
        let (&key, args) = rest.split_first()?;
        let key = key.to_string();

        let cmd = match (verb, args) {
            ("GET", []) => Command::Get { key },
            ("SET", [value]) => Command::Set {
                key,
                value: value.to_string(),
            },
            ("EXPIRE", [seconds]) => Command::Expire {
                key,
                seconds: seconds.parse().ok()?,
            },
            ("ZRANK", [member]) => Command::ZRank {
                key,
                member: member.to_string(),
            },
            ("ZADD", pairs) if !pairs.is_empty() && pairs.len() % 2 == 0 => Command::ZAdd {
                key,
                pairs: pairs
                    .chunks_exact(2)
                    .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                    .collect(),
            },
            ("ZRANGE", [start, end]) => Command::ZRange {
                key,
                start: start.to_string(),
                end: end.to_string(),
                with_scores: false,
            },
            ("ZRANGE", [start, end, flag]) if *flag == WITHSCORES => Command::ZRange {
                key,
                start: start.to_string(),
                end: end.to_string(),
                with_scores: true,
            },
            _ => return None,
        };

        Some(cmd)
    }

    /// Commands that may change stored state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. } | Command::Expire { .. } | Command::ZAdd { .. }
        )
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Expire { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRank { key, .. }
            | Command::ZRange { key, .. } => key,
        }
    }
}
