//! Remote URL handling for the source repository

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Everything except unreserved characters is encoded in the credential.
const CREDENTIAL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SCHEME_SEPARATOR: &str = "://";
const REDACTED: &str = "***";

/// The remote the working copy tracks.
///
/// When credentials are configured the clone URL carries them, so it is
/// kept as a secret: there is no `Display`, `Debug` is redacted, and
/// [`RemoteUrl::scrub`] removes it from any tool output before that output
/// is logged or put in an error.
pub struct RemoteUrl {
    public: String,
    authenticated: Option<SecretString>,
    /// `user:token@` in encoded and raw form, longest first.
    userinfo: Vec<SecretString>,
}

impl RemoteUrl {
    /// Build the clone URL from the configured source and optional credentials.
    ///
    /// `username:percent-encoded(token)@` is inserted right after the scheme
    /// separator. Without a username, or for scp-like sources with no
    /// scheme, the source is used verbatim.
    pub fn new(source: &str, username: Option<&str>, token: Option<&SecretString>) -> Self {
        let public = strip_userinfo(source);
        let username = match username {
            Some(u) if !u.is_empty() => u,
            _ => return Self::anonymous(source, public),
        };
        let Some(idx) = source.find(SCHEME_SEPARATOR) else {
            return Self::anonymous(source, public);
        };
        let (scheme, rest) = source.split_at(idx + SCHEME_SEPARATOR.len());

        let mut forms = match token {
            Some(t) => {
                let raw = t.expose_secret();
                let encoded = utf8_percent_encode(raw, CREDENTIAL_ENCODE_SET).to_string();
                vec![
                    format!("{}:{}@", username, encoded),
                    format!("{}:{}@", username, raw),
                ]
            }
            None => vec![format!("{}@", username)],
        };
        let authenticated = format!("{}{}{}", scheme, forms[0], rest);
        forms.sort_by_key(|f| std::cmp::Reverse(f.len()));
        forms.dedup();

        Self {
            public,
            authenticated: Some(SecretString::from(authenticated)),
            userinfo: forms.into_iter().map(SecretString::from).collect(),
        }
    }

    fn anonymous(source: &str, public: String) -> Self {
        let authenticated = if public == source {
            None
        } else {
            Some(SecretString::from(source.to_string()))
        };
        Self {
            public,
            authenticated,
            userinfo: Vec::new(),
        }
    }

    /// The URL without any credentials; safe to log.
    pub fn public(&self) -> &str {
        &self.public
    }

    /// The URL to hand to git. Never log this value.
    pub fn expose(&self) -> &str {
        match &self.authenticated {
            Some(url) => url.expose_secret(),
            None => &self.public,
        }
    }

    /// True when `other` names the same remote, ignoring credentials.
    pub fn same_remote(&self, other: &str) -> bool {
        strip_userinfo(other) == self.public
    }

    /// Mask the userinfo of every URL in `text`.
    ///
    /// Only the part between `://` and `@` is touched, so a short token that
    /// happens to appear elsewhere in the message is left alone. The known
    /// credential forms are matched first because a raw token may contain
    /// `/` or `@`.
    pub fn scrub(&self, text: &str) -> String {
        let mut scrubbed = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(idx) = rest.find(SCHEME_SEPARATOR) {
            let (head, tail) = rest.split_at(idx + SCHEME_SEPARATOR.len());
            scrubbed.push_str(head);
            rest = match self.userinfo_len(tail) {
                Some(len) => {
                    scrubbed.push_str(REDACTED);
                    &tail[len - 1..]
                }
                None => tail,
            };
        }
        scrubbed.push_str(rest);
        scrubbed
    }

    /// Length of the `user[:password]@` prefix of `tail`, if it has one.
    fn userinfo_len(&self, tail: &str) -> Option<usize> {
        if let Some(known) = self
            .userinfo
            .iter()
            .find(|form| tail.starts_with(form.expose_secret()))
        {
            return Some(known.expose_secret().len());
        }
        let authority_end = tail
            .find(|c: char| c == '/' || c == '\'' || c == '"' || c.is_whitespace())
            .unwrap_or(tail.len());
        tail[..authority_end].rfind('@').map(|at| at + 1)
    }

    /// The URL with the userinfo part masked, e.g. `https://***@host/repo.git`.
    pub fn redacted(&self) -> String {
        match (self.authenticated.is_some(), self.public.find(SCHEME_SEPARATOR)) {
            (true, Some(idx)) => {
                let (scheme, rest) = self.public.split_at(idx + SCHEME_SEPARATOR.len());
                format!("{}{}@{}", scheme, REDACTED, rest)
            }
            _ => self.public.clone(),
        }
    }
}

impl fmt::Debug for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteUrl").field(&self.redacted()).finish()
    }
}

/// Remove a `user[:password]@` part following the scheme separator.
pub fn strip_userinfo(url: &str) -> String {
    let Some(idx) = url.find(SCHEME_SEPARATOR) else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(idx + SCHEME_SEPARATOR.len());
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}
