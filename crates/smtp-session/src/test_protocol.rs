//! A small SMTP command machine for driving sessions in tests.
//! It handles one line per call to `parse`.
use async_trait::async_trait;
use memchr::memmem;
use message::SmtpMessage;
use rfc5321::{Protocol, ProtocolConfig, ProtocolHooks, Reply};

pub struct MiniSmtp {
    config: ProtocolConfig,
    hooks: ProtocolHooks,
    helo: String,
    from: Option<String>,
    to: Vec<String>,
    data: Option<Vec<u8>>,
}

fn path_argument(args: &str) -> String {
    let path = args.split_once(':').map(|(_, path)| path).unwrap_or(args);
    path.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

impl MiniSmtp {
    fn command(&mut self, line: &str) -> Reply {
        let (verb, args) = line.split_once(' ').unwrap_or((line, ""));
        match verb.to_ascii_uppercase().as_str() {
            "HELO" | "EHLO" => {
                self.helo = args.to_string();
                let mut lines = vec![format!("Hello {args}")];
                if !self.config.auth_mechanisms.is_empty() {
                    lines.push(format!("AUTH {}", self.config.auth_mechanisms.join(" ")));
                }
                Reply::new(250, lines)
            }
            "MAIL" => {
                let from = path_argument(args);
                if !self.hooks.sender_validator.validate_sender(&from) {
                    return Reply::with_code_and_message(550, &format!("Invalid sender {from}"));
                }
                let reply = Reply::with_code_and_message(250, &format!("Sender {from} ok"));
                self.from = Some(from);
                reply
            }
            "RCPT" => {
                let to = path_argument(args);
                if !self.hooks.recipient_validator.validate_recipient(&to) {
                    return Reply::with_code_and_message(550, &format!("Invalid recipient {to}"));
                }
                let reply = Reply::with_code_and_message(250, &format!("Recipient {to} ok"));
                self.to.push(to);
                reply
            }
            "DATA" => {
                if self.from.is_none() || self.to.is_empty() {
                    return Reply::with_code_and_message(503, "Bad sequence of commands");
                }
                self.data = Some(vec![]);
                Reply::with_code_and_message(354, "End data with <CR><LF>.<CR><LF>")
            }
            "AUTH" => {
                let mut parts = args.split(' ');
                let mechanism = parts.next().unwrap_or_default();
                let rest: Vec<String> = parts.map(String::from).collect();
                match self
                    .hooks
                    .authenticator
                    .validate_authentication(mechanism, &rest)
                {
                    Ok(()) => Reply::with_code_and_message(235, "Authentication successful"),
                    Err(reply) => reply,
                }
            }
            "QUIT" => Reply::closing(&self.config.hostname),
            _ => Reply::unrecognised_command(),
        }
    }

    async fn finish_data(&mut self) -> Reply {
        let message = SmtpMessage {
            helo: self.helo.clone(),
            from: self.from.take().unwrap_or_default(),
            to: std::mem::take(&mut self.to),
            data: self.data.take().unwrap_or_default(),
        };
        match self.hooks.message_sink.message_received(message).await {
            Ok(id) => Reply::with_code_and_message(250, &format!("Ok: queued as {id}")),
            Err(_) => Reply::with_code_and_message(452, "Unable to store message"),
        }
    }
}

#[async_trait]
impl Protocol for MiniSmtp {
    fn new(config: ProtocolConfig, hooks: ProtocolHooks) -> Self {
        Self {
            config,
            hooks,
            helo: String::new(),
            from: None,
            to: vec![],
            data: None,
        }
    }

    fn hostname(&self) -> &str {
        &self.config.hostname
    }

    fn start(&mut self) -> Reply {
        Reply::with_code_and_message(220, &format!("{} ESMTP ready", self.config.hostname))
    }

    async fn parse(&mut self, mut buffer: Vec<u8>) -> (Vec<u8>, Option<Reply>) {
        let Some(end) = memmem::find(&buffer, b"\r\n") else {
            return (buffer, None);
        };
        let rest = buffer.split_off(end + 2);
        let line = &buffer[..end];

        if self.data.is_some() {
            if line == b"." {
                return (rest, Some(self.finish_data().await));
            }
            let line = line.strip_prefix(b".").unwrap_or(line);
            if let Some(data) = self.data.as_mut() {
                data.extend_from_slice(line);
                data.extend_from_slice(b"\r\n");
            }
            return (rest, None);
        }

        let reply = self.command(&String::from_utf8_lossy(line));
        (rest, Some(reply))
    }
}

/// Never consumes anything it is given
pub struct StuckProtocol {
    hostname: String,
}

#[async_trait]
impl Protocol for StuckProtocol {
    fn new(config: ProtocolConfig, _hooks: ProtocolHooks) -> Self {
        Self {
            hostname: config.hostname,
        }
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn start(&mut self) -> Reply {
        Reply::with_code_and_message(220, "stuck")
    }

    async fn parse(&mut self, buffer: Vec<u8>) -> (Vec<u8>, Option<Reply>) {
        (buffer, None)
    }
}
