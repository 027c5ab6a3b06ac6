//! Session seeding and the external login collaborator.

use crate::config::{SessionConfig, UpstreamConfig};
use bondlab_core::data::{Cookie, CookieRefresher, SessionCookies, SessionError};
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Seed cookies read from the environment once, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSeed {
    pub cookies: Option<SessionCookies>,
}

impl EnvSeed {
    pub fn from_env(upstream: &UpstreamConfig) -> Self {
        Self::from_lookup(upstream, |name| std::env::var(name).ok())
    }

    /// Seed from any variable lookup. Both values must be present and
    /// non-blank, otherwise there is no seed.
    pub fn from_lookup(upstream: &UpstreamConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let session = lookup(&upstream.session_cookie_env);
        let auth = lookup(&upstream.auth_cookie_env);
        let cookies = match (session, auth) {
            (Some(s), Some(a)) => Some(SessionCookies::new(
                Cookie::new(&upstream.session_cookie, s.trim()),
                Cookie::new(&upstream.auth_cookie, a.trim()),
            ))
            .filter(SessionCookies::is_complete),
            _ => None,
        };
        debug!(seeded = cookies.is_some(), "session seed read from environment");
        Self { cookies }
    }
}

/// Runs an external login program and reads `NAME=VALUE` lines for the two
/// configured cookie names from its stdout.
#[derive(Debug, Clone)]
pub struct CommandRefresher {
    program: String,
    args: Vec<String>,
    session_cookie: String,
    auth_cookie: String,
    timeout: Duration,
}

impl CommandRefresher {
    /// `None` when no login command is configured.
    pub fn from_config(session: &SessionConfig, upstream: &UpstreamConfig) -> Option<Self> {
        let (program, args) = session.login_command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            session_cookie: upstream.session_cookie.clone(),
            auth_cookie: upstream.auth_cookie.clone(),
            timeout: session
                .login_timeout_secs
                .map_or(DEFAULT_LOGIN_TIMEOUT, Duration::from_secs),
        })
    }

    fn run(&self) -> Result<String, SessionError> {
        let failed = |msg: String| SessionError::LoginFailed(msg);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("spawn {}: {e}", self.program)))?;

        // Both pipes drain while we poll, so a chatty command never blocks
        // on a full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(failed(format!(
                        "{} timed out after {}s",
                        self.program,
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(failed(format!("wait for {}: {e}", self.program))),
            }
        };

        let stdout = collect(stdout).map_err(|e| failed(format!("read login output: {e}")))?;
        if !status.success() {
            let stderr = collect(stderr).unwrap_or_default();
            return Err(failed(format!(
                "{} exited with {status}: {}",
                self.program,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_string(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<String>>) -> io::Result<String> {
    reader
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe reader panicked")))
}

/// Pick the two named cookies out of `NAME=VALUE` lines. Other lines are
/// ignored; a `Set-Cookie`-style `; Path=/` tail is dropped.
pub fn parse_cookie_lines(
    output: &str,
    session_cookie: &str,
    auth_cookie: &str,
) -> Result<SessionCookies, SessionError> {
    let mut session = None;
    let mut auth = None;
    for line in output.lines() {
        let Some((name, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.split(';').next().unwrap_or("").trim();
        match name.trim() {
            n if n == session_cookie => session = Some(value.to_string()),
            n if n == auth_cookie => auth = Some(value.to_string()),
            _ => {}
        }
    }
    match (session, auth) {
        (Some(s), Some(a)) => {
            let cookies =
                SessionCookies::new(Cookie::new(session_cookie, s), Cookie::new(auth_cookie, a));
            if cookies.is_complete() {
                Ok(cookies)
            } else {
                Err(SessionError::IncompleteCookies)
            }
        }
        _ => Err(SessionError::IncompleteCookies),
    }
}

impl CookieRefresher for CommandRefresher {
    fn login(&self) -> Result<SessionCookies, SessionError> {
        info!(program = %self.program, "running login command");
        let output = self.run()?;
        parse_cookie_lines(&output, &self.session_cookie, &self.auth_cookie)
    }
}
