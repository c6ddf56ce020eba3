use serde::{Deserialize, Serialize};

/// Status code of the reply to QUIT; the connection is closed once
/// a reply carrying it has been transmitted.
pub const CLOSING_CHANNEL: u16 = 221;

/// An SMTP reply: a status code and the ordered text lines that
/// make up its content. No line contains a line break.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Hash)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Any `\n`, `\r\n` or lone `\r` inside the supplied text starts a
    /// new reply line, so text can never terminate the reply early.
    pub fn new<S: AsRef<str>>(code: u16, lines: impl IntoIterator<Item = S>) -> Self {
        let mut split = vec![];
        for text in lines {
            for line in text.as_ref().lines() {
                split.extend(line.split('\r').map(str::to_string));
            }
        }
        Self { code, lines: split }
    }

    pub fn with_code_and_message(code: u16, message: &str) -> Self {
        Self::new(code, [message])
    }

    pub fn ok() -> Self {
        Self::new(250, ["Ok"])
    }

    pub fn closing(hostname: &str) -> Self {
        Self::new(CLOSING_CHANNEL, [format!("{hostname} Bye")])
    }

    pub fn unrecognised_command() -> Self {
        Self::new(500, ["Unrecognised command"])
    }

    pub fn is_closing(&self) -> bool {
        self.code == CLOSING_CHANNEL
    }

    /// Render the reply as the lines that go on the wire, each
    /// terminated by CRLF. All but the last line use the `-`
    /// continuation separator.
    pub fn wire_lines(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return vec![format!("{}\r\n", self.code)];
        }

        let last = self.lines.len() - 1;
        self.lines
            .iter()
            .enumerate()
            .map(|(n, line)| {
                let sep = if n == last { ' ' } else { '-' };
                format!("{}{sep}{line}\r\n", self.code)
            })
            .collect()
    }
}

/// Renders the whole reply on one line, as used in logs
impl std::fmt::Display for Reply {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.code)?;
        for line in &self.lines {
            write!(fmt, " {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal;

    #[test]
    fn single_line_reply() {
        assert_equal!(Reply::ok().wire_lines(), vec!["250 Ok\r\n".to_string()]);
        assert_equal!(
            Reply::unrecognised_command().wire_lines(),
            vec!["500 Unrecognised command\r\n".to_string()]
        );
    }

    #[test]
    fn multi_line_reply() {
        let reply = Reply::with_code_and_message(250, "mail.example.com Hello\nPIPELINING\nAUTH PLAIN");
        assert_equal!(
            reply.wire_lines(),
            vec![
                "250-mail.example.com Hello\r\n".to_string(),
                "250-PIPELINING\r\n".to_string(),
                "250 AUTH PLAIN\r\n".to_string(),
            ]
        );
        assert_equal!(
            reply.to_string(),
            "250 mail.example.com Hello PIPELINING AUTH PLAIN"
        );
    }

    #[test]
    fn empty_reply() {
        assert_equal!(Reply::new(354, Vec::<String>::new()).wire_lines(), vec!["354\r\n".to_string()]);
    }

    #[test]
    fn embedded_line_breaks_become_continuations() {
        let reply = Reply::new(550, ["no\r\nsuch user", "go\raway\n"]);
        assert_equal!(reply.lines, vec!["no", "such user", "go", "away"]);
        assert_equal!(
            reply.wire_lines().concat(),
            "550-no\r\n550-such user\r\n550-go\r\n550 away\r\n"
        );
    }

    #[test]
    fn closing() {
        assert!(Reply::closing("localhost").is_closing());
        assert_equal!(Reply::closing("localhost").to_string(), "221 localhost Bye");
        assert!(!Reply::ok().is_closing());
    }

    #[test]
    fn serializes() {
        let reply = Reply::new(221, ["Bye"]);
        assert_equal!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"code":221,"lines":["Bye"]}"#
        );
    }
}
