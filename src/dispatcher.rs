//! Routes parsed commands to the stores, renders replies and decides which
//! commands are appended to the log.

use std::sync::Arc;

use crate::aof::AofWriter;
use crate::command::Command;
use crate::storage::KvStore;
use crate::zset::ZSetStore;

pub const OK: &str = "OK";
pub const NIL: &str = "(nil)";
pub const INVALID: &str = "COMMAND NOT VALID";
pub const EMPTY_LIST: &str = "(empty list or set)";

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: String,
    /// Whether the command changed state and belongs in the log.
    pub persist: bool,
}

impl Outcome {
    fn read(reply: impl Into<String>) -> Self {
        Outcome {
            reply: reply.into(),
            persist: false,
        }
    }

    fn write(reply: impl Into<String>, persist: bool) -> Self {
        Outcome {
            reply: reply.into(),
            persist,
        }
    }
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    strings: KvStore,
    zsets: ZSetStore,
    aof: Option<AofWriter>,
    // Held from the in-memory write until the command is queued, so log
    // order matches the order writes were applied.
    write_order: Arc<tokio::sync::Mutex<()>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Sends every state-changing command to `aof` from now on.
    pub fn with_aof(mut self, aof: AofWriter) -> Self {
        self.aof = Some(aof);
        self
    }

    pub fn strings(&self) -> &KvStore {
        &self.strings
    }

    pub fn zsets(&self) -> &ZSetStore {
        &self.zsets
    }

    /// Runs one command line and returns its reply, queueing it for the log
    /// when it changed state.
    pub async fn execute(&self, line: &str) -> String {
        let line = line.trim();
        let Some(cmd) = Command::parse(line) else {
            return INVALID.to_string();
        };

        let Some(aof) = self.aof.as_ref().filter(|_| cmd.is_write()) else {
            return self.run(cmd).reply;
        };

        let _order = self.write_order.lock().await;
        let outcome = self.run(cmd);
        if outcome.persist {
            aof.append(line).await;
        }
        outcome.reply
    }

    /// Runs one command line against the stores without touching the log.
    pub fn apply(&self, line: &str) -> Outcome {
        match Command::parse(line) {
            Some(cmd) => self.run(cmd),
            None => Outcome::read(INVALID),
        }
    }

    fn run(&self, cmd: Command) -> Outcome {
        log::trace!("{cmd:?} on key {:?}", cmd.key());
        match cmd {
            Command::Get { key } => Outcome::read(self.strings.get(&key).unwrap_or_else(|| NIL.to_string())),
            Command::Set { key, value } => {
                self.strings.set(key, value);
                Outcome::write(OK, true)
            }
            Command::Expire { key, seconds } => {
                // The same key may exist in both stores; strings win.
                let hit = match self.strings.expire(&key, seconds) {
                    0 => self.zsets.expire(&key, seconds),
                    hit => hit,
                };
                Outcome::write(hit.to_string(), hit != 0)
            }
            Command::ZAdd { key, pairs } => {
                let Some(scored) = parse_scores(&pairs) else {
                    return Outcome::read(INVALID);
                };
                let added: u64 = scored
                    .into_iter()
                    .map(|(score, member)| u64::from(self.zsets.add(&key, member, score)))
                    .sum();
                Outcome::write(added.to_string(), added > 0)
            }
            Command::ZRank { key, member } => match self.zsets.rank(&key, &member) {
                Some(rank) => Outcome::read(rank.to_string()),
                None => Outcome::read(NIL),
            },
            Command::ZRange {
                key,
                start,
                end,
                with_scores,
            } => {
                let entries = self.zsets.range(&key, parse_bound(&start), parse_bound(&end));
                Outcome::read(format_range(&entries, with_scores))
            }
        }
    }
}

/// Scores that do not parse count as 0. A NaN score has no place in the
/// ordering, so it rejects the whole command before anything is added.
fn parse_scores(pairs: &[(String, String)]) -> Option<Vec<(f64, &str)>> {
    pairs
        .iter()
        .map(|(score, member)| {
            let score = score.parse::<f64>().unwrap_or(0.0);
            (!score.is_nan()).then_some((score, member.as_str()))
        })
        .collect()
}

/// Range positions that do not parse as integers count as 0.
fn parse_bound(bound: &str) -> i64 {
    bound.parse().unwrap_or(0)
}

fn format_range(entries: &[(String, f64)], with_scores: bool) -> String {
    if entries.is_empty() {
        return EMPTY_LIST.to_string();
    }

    let mut out = String::new();
    let mut n = 1;
    for (member, score) in entries {
        out.push_str(&format!("{n}) '{member}'\n"));
        n += 1;
        if with_scores {
            out.push_str(&format!("{n}) {}\n", format_score(*score)));
            n += 1;
        }
    }
    out
}

/// Shortest `%g`-style rendering: plain notation for exponents in
/// `-4..6`, scientific (`1e+06`, `2.5e-05`) outside it.
pub fn format_score(score: f64) -> String {
    if score.is_nan() {
        return "NaN".to_string();
    }
    if score.is_infinite() {
        return if score > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if score == 0.0 {
        return format!("{score}");
    }

    let sci = format!("{score:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return format!("{score}");
    };
    let exp: i32 = match exp.parse() {
        Ok(exp) => exp,
        Err(_) => return format!("{score}"),
    };

    if (-4..6).contains(&exp) {
        format!("{score}")
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    }
}
