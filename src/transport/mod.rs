use async_trait::async_trait;
use regex_lite::Regex;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::TransportError;
use crate::models::DeviceDescriptor;

/// Pushes a prepared command sequence to one device over one session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session, send every command in order, close. Returns the session transcript.
    async fn push(
        &self,
        device: &DeviceDescriptor,
        commands: &[String],
    ) -> Result<String, TransportError>;
}

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Interactive SSH shell transport (libssh2), one PTY session per push
#[derive(Debug, Clone)]
pub struct SshTransport {
    user: String,
    pass: String,
    port: u16,
    connect_timeout: Duration,
    command_delay: Duration,
    read_timeout: Duration,
}

impl SshTransport {
    pub fn new(cfg: &Config) -> Self {
        Self {
            user: cfg.ssh_user.clone(),
            pass: cfg.ssh_pass.clone(),
            port: cfg.ssh_port,
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            command_delay: Duration::from_millis(cfg.command_delay_ms),
            read_timeout: Duration::from_secs(cfg.read_timeout_secs),
        }
    }

    /// Create an SSH session and authenticate with password + keyboard-interactive.
    /// This is blocking, so call from a spawn_blocking context.
    fn connect(&self, host: &str) -> Result<ssh2::Session, TransportError> {
        let address = format!("{}:{}", host, self.port);
        let connect_err = |reason: String| TransportError::Connect {
            address: address.clone(),
            reason,
        };

        let sock = address
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("Invalid address: {}", e)))?
            .next()
            .ok_or_else(|| connect_err("Address did not resolve".to_string()))?;
        let tcp = TcpStream::connect_timeout(&sock, self.connect_timeout)
            .map_err(|e| connect_err(format!("TCP connection failed: {}", e)))?;

        let mut session =
            ssh2::Session::new().map_err(|e| connect_err(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.connect_timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| connect_err(format!("SSH handshake failed: {}", e)))?;

        // Try password auth first
        match session.userauth_password(&self.user, &self.pass) {
            Ok(_) if session.authenticated() => return Ok(session),
            _ => {}
        }

        let mut prompter = PasswordPrompt {
            password: self.pass.clone(),
        };
        let _ = session.userauth_keyboard_interactive(&self.user, &mut prompter);

        if session.authenticated() {
            Ok(session)
        } else {
            Err(TransportError::Auth {
                user: self.user.clone(),
                address,
            })
        }
    }

    fn run_session(
        &self,
        host: &str,
        prompt: &Regex,
        commands: &[String],
    ) -> Result<String, TransportError> {
        let session = self.connect(host)?;
        let session_err = |e: ssh2::Error| TransportError::Session(e.to_string());

        let mut channel = session.channel_session().map_err(session_err)?;
        channel.request_pty("vt100", None, Some((512, 24, 0, 0))).map_err(session_err)?;
        channel.shell().map_err(session_err)?;
        // Short poll interval; the per-command deadline is enforced in read_until_prompt
        session.set_timeout(250);

        let mut transcript = self.read_until_prompt(&mut channel, prompt)?;
        for command in commands {
            channel
                .write_all(format!("{}\n", command).as_bytes())
                .map_err(|e| TransportError::Session(format!("Write failed: {}", e)))?;
            channel
                .flush()
                .map_err(|e| TransportError::Session(format!("Write failed: {}", e)))?;
            std::thread::sleep(self.command_delay);

            let output = self.read_until_prompt(&mut channel, prompt)?;
            if let Some(line) = find_error_line(&output, command) {
                return Err(TransportError::Command {
                    command: command.clone(),
                    output: line.to_string(),
                });
            }
            transcript.push_str(&output);
        }

        let _ = channel.send_eof();
        let _ = channel.close();
        Ok(transcript)
    }

    /// Read until the prompt regex matches the last output line or the read timeout elapses
    fn read_until_prompt(
        &self,
        channel: &mut ssh2::Channel,
        prompt: &Regex,
    ) -> Result<String, TransportError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut output = String::new();
        let mut buf = [0u8; 4096];

        loop {
            match channel.read(&mut buf) {
                Ok(0) if channel.eof() => break,
                Ok(0) => {}
                Ok(n) => {
                    output.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if ends_with_prompt(&output, prompt) {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(TransportError::Session(format!("Read failed: {}", e))),
            }
            if Instant::now() >= deadline {
                tracing::warn!("Timed out waiting for prompt after {:?}", self.read_timeout);
                break;
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn push(
        &self,
        device: &DeviceDescriptor,
        commands: &[String],
    ) -> Result<String, TransportError> {
        let prompt = Regex::new(device.device_type.profile().prompt_pattern())
            .map_err(|e| TransportError::Session(format!("Invalid prompt pattern: {}", e)))?;
        let this = self.clone();
        let host = device.mgmt_address.clone();
        let commands = commands.to_vec();

        tokio::task::spawn_blocking(move || this.run_session(&host, &prompt, &commands))
            .await
            .map_err(|e| TransportError::Session(format!("Task join error: {}", e)))?
    }
}

fn ends_with_prompt(output: &str, prompt: &Regex) -> bool {
    output
        .lines()
        .last()
        .map_or(false, |line| prompt.is_match(line.trim_end_matches('\r')))
}

// `%` lines that are command rejections rather than console log messages
const REJECTION_MARKERS: [&str; 6] = [
    "% Invalid",
    "% Incomplete",
    "% Ambiguous",
    "% Unknown command",
    "% Unrecognized",
    "% Error",
];

/// First output line that signals the device rejected `command`.
/// The device's echo of the command itself is ignored.
fn find_error_line<'a>(output: &'a str, command: &str) -> Option<&'a str> {
    let command = command.trim();
    output
        .lines()
        .map(str::trim)
        .filter(|line| command.is_empty() || !line.ends_with(command))
        .find(|line| {
            REJECTION_MARKERS.iter().any(|m| line.starts_with(*m))
                || line.starts_with("Error:")
                || line.contains("syntax error")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceType;

    #[test]
    fn test_error_line_detection() {
        assert_eq!(
            find_error_line(
                "interface Gi1\r\n% Invalid input detected at '^' marker.\r\nR1(config)#",
                "interface Gi1"
            ),
            Some("% Invalid input detected at '^' marker.")
        );
        assert_eq!(
            find_error_line("set interfaces\nsyntax error, expecting <command>.", "set interfaces"),
            Some("syntax error, expecting <command>.")
        );
        assert_eq!(
            find_error_line("Error: Unrecognized command found at '^' position.", "vlan 100"),
            Some("Error: Unrecognized command found at '^' position.")
        );
        assert_eq!(find_error_line("R1(config-if)#\r\n", "shutdown"), None);
    }

    #[test]
    fn test_echo_and_console_messages_are_not_errors() {
        let echoed = "R1(config-if)#description Error: legacy\r\nR1(config-if)#";
        assert_eq!(find_error_line(echoed, "description Error: legacy"), None);

        let syslog = "no shutdown\r\n%LINK-3-UPDOWN: Interface Gi1, changed state to up\r\nR1(config-if)#";
        assert_eq!(find_error_line(syslog, "no shutdown"), None);

        let incomplete = "xconnect 10.0.0.1\r\n% Incomplete command.\r\nR1(config-if)#";
        assert_eq!(find_error_line(incomplete, "xconnect 10.0.0.1"), Some("% Incomplete command."));
    }

    #[test]
    fn test_prompt_detection() {
        let prompt = Regex::new(DeviceType::CiscoXe.profile().prompt_pattern()).unwrap();
        assert!(ends_with_prompt("configure terminal\r\nR1(config)#", &prompt));
        assert!(ends_with_prompt("banner\r\nR1>", &prompt));
        assert!(!ends_with_prompt("Building configuration...\r\n", &prompt));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_error() {
        let mut cfg = Config::for_dir(std::path::Path::new("/tmp"));
        cfg.connect_timeout_secs = 1;
        let transport = SshTransport::new(&cfg);
        let device = DeviceDescriptor {
            name: "pe-01".to_string(),
            device_type: DeviceType::CiscoXr,
            device_role: crate::models::DeviceRole::Pe,
            mgmt_address: "invalid host name".to_string(),
            loopback_address: None,
            customer_provisioning: true,
            forbidden_interfaces: Vec::new(),
        };
        let err = transport.push(&device, &["show clock".to_string()]).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
