use serde::{Deserialize, Serialize};

/// A reverse-path or forward-path as given to MAIL FROM or RCPT TO,
/// split into its source route, mailbox, domain and any trailing
/// ESMTP parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub relays: Vec<String>,
    pub mailbox: String,
    pub domain: String,
    pub params: String,
}

impl Path {
    /// Parse a path in its loosest form. Angle brackets are optional,
    /// the source route (`@relay1,@relay2:`) is optional, and the
    /// null path `<>` yields an empty mailbox and domain.
    /// Parsing never fails; whatever was accepted by the protocol is
    /// retained as well as it can be.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (address, params) = match text.strip_prefix('<') {
            Some(rest) => match rest.find('>') {
                Some(rangle) => (&rest[..rangle], rest[rangle + 1..].trim()),
                None => (rest, ""),
            },
            None => match text.split_once(char::is_whitespace) {
                Some((address, params)) => (address, params.trim()),
                None => (text, ""),
            },
        };

        let route = if address.starts_with('@') {
            address.split_once(':')
        } else {
            None
        };

        let (relays, email) = match route {
            Some((route, email)) => (
                route
                    .split(',')
                    .map(|relay| relay.trim().trim_start_matches('@').to_string())
                    .filter(|relay| !relay.is_empty())
                    .collect(),
                email,
            ),
            None => (vec![], address),
        };

        let (mailbox, domain) = match email.split_once('@') {
            Some((mailbox, domain)) => (mailbox, domain),
            None => (email, ""),
        };

        Self {
            relays,
            mailbox: mailbox.to_string(),
            domain: domain.to_string(),
            params: params.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.mailbox.is_empty() && self.domain.is_empty()
    }

    pub fn email(&self) -> String {
        if self.domain.is_empty() {
            self.mailbox.clone()
        } else {
            format!("{}@{}", self.mailbox, self.domain)
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "<{}>", self.email())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal;

    #[test]
    fn plain_address() {
        assert_equal!(
            Path::parse("user@example.com"),
            Path {
                relays: vec![],
                mailbox: "user".to_string(),
                domain: "example.com".to_string(),
                params: "".to_string(),
            }
        );
    }

    #[test]
    fn bracketed_with_params() {
        let path = Path::parse("<user@example.com> SIZE=1000 BODY=8BITMIME");
        assert_equal!(path.email(), "user@example.com");
        assert_equal!(path.params, "SIZE=1000 BODY=8BITMIME");
        assert_equal!(path.to_string(), "<user@example.com>");
    }

    #[test]
    fn source_route() {
        let path = Path::parse("<@relay1.example,@relay2.example:user@example.com>");
        assert_equal!(
            path.relays,
            vec!["relay1.example".to_string(), "relay2.example".to_string()]
        );
        assert_equal!(path.mailbox, "user");
        assert_equal!(path.domain, "example.com");
    }

    #[test]
    fn null_path() {
        let path = Path::parse("<>");
        assert!(path.is_null());
        assert_equal!(path.to_string(), "<>");
    }

    #[test]
    fn local_only() {
        let path = Path::parse("postmaster");
        assert_equal!(path.mailbox, "postmaster");
        assert_equal!(path.domain, "");
        assert_equal!(path.email(), "postmaster");
    }
}
