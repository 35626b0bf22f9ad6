//! expect/send state machine (spec §4.5): pattern matching against
//! accumulated pty output, ANSI stripping, and the post-command exit-code
//! probe. Grounded on the match-table/line-type shape of
//! `original_source/discovery/record3/Expect.go` and
//! `original_source/discovery/proc/ptyprocess.go`: a complete, newline-
//! terminated line is always an `OUTPUT_LINE`; only the still-buffered
//! partial line is peeked and matched against the table on every poll.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, Result};
use crate::pty::PtyHandle;
use crate::rerr;

const POLL_STEP: Duration = Duration::from_millis(250);

/// Caps the `OUTPUT_LINE` history kept across one `expect` call; oldest
/// lines are dropped once the cap is hit (grounded on
/// `constdef.MAX_OUTPUT_LINE_COUNT` = 10000 in the original tool -- this
/// crate has no separate live-capture/"recorder" path, so the replay-side
/// cap is the only one that applies here).
const MAX_OUTPUT_LINES: usize = 10_000;

enum LineType {
    Prompt,
    SshAuth,
    More,
}

enum Matcher {
    Regex(regex::Regex),
    Contains(String),
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Contains(s) => text.contains(s.as_str()),
        }
    }
}

struct LineMatch {
    line_type: LineType,
    matcher: Matcher,
}

/// The caller's own pattern plus the two built-in auto-response entries
/// (spec §4.5 "SSH host-key prompts and pager `--More--` breaks are
/// answered automatically, never surfaced to the script").
fn default_table(pattern: &regex::Regex) -> Vec<LineMatch> {
    vec![
        LineMatch { line_type: LineType::Prompt, matcher: Matcher::Regex(pattern.clone()) },
        LineMatch {
            line_type: LineType::SshAuth,
            matcher: Matcher::Regex(regex::Regex::new(r"(?i)continue connecting \(yes/no.*\)\?\s*").unwrap()),
        },
        LineMatch { line_type: LineType::More, matcher: Matcher::Contains("--More--".to_string()) },
    ]
}

/// Strips SGR/CSI escape sequences so pattern matching runs against the
/// text a human would actually read on the terminal.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if matches!(chars.peek(), Some('[')) {
                chars.next();
                while let Some(&c2) = chars.peek() {
                    chars.next();
                    if c2.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else if matches!(chars.peek(), Some(']')) {
                chars.next();
                while let Some(&c2) = chars.peek() {
                    chars.next();
                    if c2 == '\u{7}' {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Decodes raw pty bytes under `charset` (spec §9: node `charset` field,
/// default `utf8`; `euckr` is the one non-UTF-8 value the original
/// supports, grounded on `convCharEncoding` in `record3/Expect.go`).
fn decode_charset(bytes: &[u8], charset: &str) -> String {
    if charset.eq_ignore_ascii_case("euckr") || charset.eq_ignore_ascii_case("euc-kr") {
        let (text, _, _) = encoding_rs::EUC_KR.decode(bytes);
        text.into_owned()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Encodes outgoing text under `charset`, the write-side mirror of
/// [`decode_charset`] (grounded on `PtyProcess.Write` in `ptyprocess.go`,
/// which transcodes before writing to the pty the same way `Read` does
/// after).
pub fn encode_charset(text: &str, charset: &str) -> Vec<u8> {
    if charset.eq_ignore_ascii_case("euckr") || charset.eq_ignore_ascii_case("euc-kr") {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode(text);
        bytes.into_owned()
    } else {
        text.as_bytes().to_vec()
    }
}

fn push_capped(lines: &mut VecDeque<String>, line: String) {
    if lines.len() >= MAX_OUTPUT_LINES {
        lines.pop_front();
    }
    lines.push_back(line);
}

/// Blocks (via the async runtime's sleep, not a thread block) until
/// `pattern` matches the accumulated, ANSI-stripped output or `timeout`
/// elapses. Equivalent to `expect_with_charset(.., "utf8")`.
pub async fn expect(pty: &mut PtyHandle, pattern: &regex::Regex, timeout: Duration) -> Result<String> {
    expect_with_charset(pty, pattern, timeout, "utf8").await
}

/// As [`expect`], but decodes pty output under `charset` first and answers
/// `SshAuth`/`More` prompts automatically without involving the caller --
/// login paths no longer need to hand-roll their own host-key regex (spec
/// §4.5, §4.4 login sequences).
pub async fn expect_with_charset(pty: &mut PtyHandle, pattern: &regex::Regex, timeout: Duration, charset: &str) -> Result<String> {
    let table = default_table(pattern);
    let deadline = Instant::now() + timeout;
    let mut committed: VecDeque<String> = VecDeque::new();
    let mut raw: Vec<u8> = Vec::new();

    loop {
        raw.extend(pty.try_recv());

        while let Some(pos) = raw.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = raw.drain(..=pos).collect();
            let line = strip_ansi(decode_charset(&line_bytes, charset).trim_end_matches(['\r', '\n']));
            push_capped(&mut committed, line);
        }

        if !raw.is_empty() {
            let pending = strip_ansi(&decode_charset(&raw, charset));
            if let Some(hit) = table.iter().find(|lm| lm.matcher.matches(&pending)) {
                match hit.line_type {
                    LineType::SshAuth => {
                        pty.write_all(b"yes\n")?;
                        raw.clear();
                    }
                    LineType::More => {
                        pty.write_all(b" ")?;
                        raw.clear();
                    }
                    LineType::Prompt => {
                        let mut out: String = committed.into_iter().collect::<Vec<_>>().join("\n");
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(&pending);
                        return Ok(out);
                    }
                }
                continue;
            }
        }

        if Instant::now() >= deadline {
            return Err(rerr!(ErrorKind::Timeout, "expect timed out after {:?} waiting for '{}'", timeout, pattern.as_str()));
        }
        tokio::time::sleep(POLL_STEP.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}

/// Runs `probe` after a command completes and parses its numeric stdout as
/// the exit code; -1 on any parse failure (spec §9 resolution — exit_code
/// stays -1 rather than panicking when the probe's output is unreadable).
pub fn parse_exit_code(probe_output: &str) -> i64 {
    probe_output
        .lines()
        .rev()
        .find_map(|line| line.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_sequences() {
        let s = "\u{1b}[31mred\u{1b}[0m text";
        assert_eq!(strip_ansi(s), "red text");
    }

    #[test]
    fn exit_code_parses_last_numeric_line() {
        assert_eq!(parse_exit_code("some output\n0\n"), 0);
        assert_eq!(parse_exit_code("some output\n127\n"), 127);
    }

    #[test]
    fn exit_code_defaults_to_minus_one_on_garbage() {
        assert_eq!(parse_exit_code("not a number\n"), -1);
    }

    #[test]
    fn euckr_roundtrips_through_encode_and_decode() {
        let encoded = encode_charset("안녕", "euckr");
        assert_eq!(decode_charset(&encoded, "euckr"), "안녕");
    }

    #[test]
    fn utf8_charset_is_a_passthrough() {
        let encoded = encode_charset("hello", "utf8");
        assert_eq!(encoded, b"hello");
        assert_eq!(decode_charset(&encoded, "utf8"), "hello");
    }

    #[tokio::test]
    async fn expect_auto_answers_ssh_host_key_prompt() {
        let mut pty = PtyHandle::spawn(
            "/bin/sh",
            &["-c".to_string(), "read -p 'are you sure you want to continue connecting (yes/no)? ' a; echo got:$a; echo done$ ".to_string()],
            None,
        )
        .unwrap();
        let re = regex::Regex::new(r"done\$\s*$").unwrap();
        let seen = expect(&mut pty, &re, Duration::from_secs(10)).await.unwrap();
        assert!(seen.contains("got:yes"));
    }
}
