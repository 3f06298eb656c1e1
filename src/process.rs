//! External program runner.
//!
//! Four of the five tools are thin shims over a command-line program
//! (ffmpeg, yt-dlp, mmdc/dot/plantuml). This module owns the plumbing they
//! share: resolving the executable, spawning with piped output, feeding
//! output lines to a parser as they arrive, enforcing an optional timeout and
//! turning a bad exit into a [`KitError`] that carries the tail of stderr.
//!
//! Every program can be overridden with an environment variable
//! (`KIT_FFMPEG=/opt/ffmpeg/bin/ffmpeg`), otherwise it is looked up on `PATH`.

use crate::error::KitError;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL: usize = 20;

/// An external program the kit delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    /// Executable name looked up on `PATH`.
    pub name: &'static str,
    /// Environment variable that overrides the executable path.
    pub env_var: &'static str,
    /// Shown when the program cannot be started.
    pub hint: &'static str,
}

pub const FFMPEG: Tool = Tool {
    name: "ffmpeg",
    env_var: "KIT_FFMPEG",
    hint: "Install FFmpeg (brew install ffmpeg / apt install ffmpeg) or set KIT_FFMPEG.",
};

pub const FFPROBE: Tool = Tool {
    name: "ffprobe",
    env_var: "KIT_FFPROBE",
    hint: "ffprobe ships with FFmpeg (brew install ffmpeg / apt install ffmpeg) or set KIT_FFPROBE.",
};

pub const YT_DLP: Tool = Tool {
    name: "yt-dlp",
    env_var: "KIT_YT_DLP",
    hint: "Install yt-dlp (pipx install yt-dlp / brew install yt-dlp) or set KIT_YT_DLP.",
};

pub const MMDC: Tool = Tool {
    name: "mmdc",
    env_var: "KIT_MMDC",
    hint: "Install mermaid-cli (npm install -g @mermaid-js/mermaid-cli), set KIT_MMDC, or use --kroki.",
};

pub const DOT: Tool = Tool {
    name: "dot",
    env_var: "KIT_DOT",
    hint: "Install Graphviz (brew install graphviz / apt install graphviz), set KIT_DOT, or use --kroki.",
};

pub const PLANTUML: Tool = Tool {
    name: "plantuml",
    env_var: "KIT_PLANTUML",
    hint: "Install PlantUML (brew install plantuml / apt install plantuml), set KIT_PLANTUML, or use --kroki.",
};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl Tool {
    /// Executable to spawn: the override variable if set, else the bare name.
    pub fn program(&self) -> PathBuf {
        match std::env::var_os(self.env_var) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from(self.name),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> KitError {
        if e.kind() == std::io::ErrorKind::NotFound {
            KitError::ToolNotFound {
                tool: self.name.to_string(),
                hint: self.hint.to_string(),
            }
        } else {
            KitError::Internal(format!("Failed to start '{}': {}", self.name, e))
        }
    }
}

/// Run `tool` and hand every output line to `on_line` as it arrives.
///
/// Used for programs whose progress is reported on stdout/stderr (ffmpeg's
/// `-progress pipe:1`, yt-dlp's `--newline`).
pub async fn run_streaming<F>(
    tool: &Tool,
    args: &[String],
    timeout: Option<Duration>,
    mut on_line: F,
) -> Result<(), KitError>
where
    F: FnMut(StreamKind, &str),
{
    debug!("Running {} {}", tool.name, args.join(" "));

    let mut child = tool.command(args).spawn().map_err(|e| tool.spawn_error(e))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| KitError::Internal("child stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| KitError::Internal("child stderr not captured".into()))?;

    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

    let drive = async {
        let mut out_open = true;
        let mut err_open = true;
        while out_open || err_open {
            tokio::select! {
                read = out_reader.read_until(b'\n', &mut out_buf), if out_open => {
                    match read {
                        Ok(0) => out_open = false,
                        Ok(_) => on_line(StreamKind::Stdout, &decode_line(&out_buf)),
                        Err(e) => {
                            debug!("{} stdout read error: {}", tool.name, e);
                            out_open = false;
                        }
                    }
                    out_buf.clear();
                }
                read = err_reader.read_until(b'\n', &mut err_buf), if err_open => {
                    match read {
                        Ok(0) => err_open = false,
                        Ok(_) => {
                            let line = decode_line(&err_buf);
                            if tail.len() == STDERR_TAIL {
                                tail.pop_front();
                            }
                            on_line(StreamKind::Stderr, &line);
                            tail.push_back(line);
                        }
                        Err(e) => {
                            debug!("{} stderr read error: {}", tool.name, e);
                            err_open = false;
                        }
                    }
                    err_buf.clear();
                }
            }
        }
        child.wait().await
    };

    let status = with_timeout(tool, timeout, drive)
        .await?
        .map_err(|e| KitError::Internal(format!("Waiting for '{}' failed: {}", tool.name, e)))?;

    let stderr_tail: Vec<String> = tail.into_iter().collect();
    check_status(tool, status, &stderr_tail.join("\n"))
}

/// Run `tool` to completion and return its raw stdout.
///
/// `stdin` is written to the child's standard input when given (PlantUML's
/// `-pipe` mode).
pub async fn run_capture(
    tool: &Tool,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, KitError> {
    debug!("Running {} {}", tool.name, args.join(" "));

    let mut cmd = tool.command(args);
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.spawn().map_err(|e| tool.spawn_error(e))?;

    if let Some(bytes) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let bytes = bytes.to_vec();
            // Feed stdin from its own task so a large stdout cannot deadlock us.
            tokio::spawn(async move {
                let _ = pipe.write_all(&bytes).await;
            });
        }
    }

    let output = with_timeout(tool, timeout, child.wait_with_output())
        .await?
        .map_err(|e| KitError::Internal(format!("Waiting for '{}' failed: {}", tool.name, e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    check_status(tool, output.status, &tail_lines(&stderr, STDERR_TAIL))?;
    Ok(output.stdout)
}

async fn with_timeout<T>(
    tool: &Tool,
    timeout: Option<Duration>,
    fut: impl Future<Output = T>,
) -> Result<T, KitError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| KitError::ToolTimedOut {
                tool: tool.name.to_string(),
                secs: limit.as_secs(),
            }),
        None => Ok(fut.await),
    }
}

fn check_status(tool: &Tool, status: ExitStatus, stderr_tail: &str) -> Result<(), KitError> {
    if status.success() {
        return Ok(());
    }
    Err(KitError::ToolFailed {
        tool: tool.name.to_string(),
        status: status.to_string(),
        stderr: if stderr_tail.trim().is_empty() {
            "(no error output)".to_string()
        } else {
            stderr_tail.to_string()
        },
    })
}

/// One output line without its terminator. Bytes that are not UTF-8
/// (titles, metadata tags) are replaced rather than ending the stream.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Last `n` non-empty lines of `text`.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SUCH: Tool = Tool {
        name: "scriptkit-no-such-program",
        env_var: "KIT_TEST_NO_SUCH_PROGRAM",
        hint: "this program does not exist",
    };

    #[test]
    fn program_defaults_to_name() {
        assert_eq!(NO_SUCH.program(), PathBuf::from("scriptkit-no-such-program"));
    }

    #[test]
    fn program_honours_override() {
        let tool = Tool {
            name: "ffmpeg",
            env_var: "KIT_TEST_OVERRIDE_FFMPEG",
            hint: "",
        };
        std::env::set_var("KIT_TEST_OVERRIDE_FFMPEG", "/opt/ff/bin/ffmpeg");
        let p = tool.program();
        std::env::remove_var("KIT_TEST_OVERRIDE_FFMPEG");
        assert_eq!(p, PathBuf::from("/opt/ff/bin/ffmpeg"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = "a\n\nb\nc\nd\n";
        assert_eq!(tail_lines(text, 2), "c\nd");
        assert_eq!(tail_lines(text, 10), "a\nb\nc\nd");
        assert_eq!(tail_lines("", 3), "");
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let err = run_capture(&NO_SUCH, &[], None, None).await.unwrap_err();
        match err {
            KitError::ToolNotFound { tool, hint } => {
                assert_eq!(tool, "scriptkit-no-such-program");
                assert!(hint.contains("does not exist"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_sees_both_pipes_and_failure() {
        let sh = Tool {
            name: "sh",
            env_var: "KIT_TEST_SH",
            hint: "",
        };
        let args = vec![
            "-c".to_string(),
            "echo out; echo err 1>&2; exit 3".to_string(),
        ];
        let mut seen = Vec::new();
        let err = run_streaming(&sh, &args, None, |kind, line| {
            seen.push((kind, line.to_string()))
        })
        .await
        .unwrap_err();

        assert!(seen.contains(&(StreamKind::Stdout, "out".to_string())));
        assert!(seen.contains(&(StreamKind::Stderr, "err".to_string())));
        match err {
            KitError::ToolFailed { stderr, .. } => assert_eq!(stderr, "err"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn decode_line_strips_terminators_and_replaces_bad_bytes() {
        assert_eq!(decode_line(b"frame=10\r\n"), "frame=10");
        assert_eq!(decode_line(b"last"), "last");
        assert_eq!(decode_line(b"title: \xff\n"), "title: \u{FFFD}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_survives_invalid_utf8_and_bulk_stderr() {
        let sh = Tool {
            name: "sh",
            env_var: "KIT_TEST_SH",
            hint: "",
        };
        let args = vec![
            "-c".to_string(),
            "printf '\\377\\n' >&2; head -c 262144 /dev/zero | tr '\\0' x >&2; echo; echo done; exit 0"
                .to_string(),
        ];
        let mut stderr_bytes = 0usize;
        let mut saw_done = false;
        let run = run_streaming(&sh, &args, None, |kind, line| match kind {
            StreamKind::Stderr => stderr_bytes += line.len(),
            StreamKind::Stdout => saw_done |= line == "done",
        });
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("runner stalled on a non-UTF-8 line")
            .unwrap();
        assert!(stderr_bytes >= 262_144);
        assert!(saw_done);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_pipes_stdin_through() {
        let cat = Tool {
            name: "cat",
            env_var: "KIT_TEST_CAT",
            hint: "",
        };
        let out = run_capture(&cat, &[], Some(b"graph TD; A-->B"), None)
            .await
            .unwrap();
        assert_eq!(out, b"graph TD; A-->B");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_slow_program() {
        let sleep = Tool {
            name: "sleep",
            env_var: "KIT_TEST_SLEEP",
            hint: "",
        };
        let err = run_capture(
            &sleep,
            &["5".to_string()],
            None,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KitError::ToolTimedOut { .. }));
    }
}
