// =============================================================================
// Notification Providers — URL templates and payload encoding
// =============================================================================
//
// Every provider is a GET endpoint whose URL is produced by substituting
// placeholders into a template:
//
//   {title}, {content}     — payload fields, always form-urlencoded
//   {token}                — SingleToken providers (e.g. ServerChan)
//   {uid}, {send_key}      — UserAndKey providers (e.g. ServerChan3 push.ft07)
//
// Encoding follows application/x-www-form-urlencoded: space => '+', every
// byte outside [A-Za-z0-9*-._] => %XX.  Receivers decode with the same rule,
// so '&', '=', '%', '+' and non-ASCII text survive intact.
//
// SECURITY: credentials never appear in Debug output or logs.
// =============================================================================

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::runtime_config::ConfigError;

/// ServerChan Turbo: one SendKey in the path.
pub const SERVERCHAN_TEMPLATE: &str =
    "https://sctapi.ftqq.com/{token}.send?title={title}&desp={content}";

/// ServerChan3: user id in the host, SendKey in the path.
pub const SERVERCHAN3_TEMPLATE: &str =
    "https://{uid}.push.ft07.com/send/{send_key}.send?title={title}&desp={content}";

const PAYLOAD_PLACEHOLDERS: [&str; 2] = ["title", "content"];

/// Credential shape of a provider.  New providers add a variant here together
/// with its placeholders; dispatch logic does not change.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    SingleToken { token: String },
    UserAndKey { uid: String, send_key: String },
}

impl ProviderKind {
    /// Placeholder names this kind fills in, besides the payload fields.
    fn credential_placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::SingleToken { .. } => &["token"],
            Self::UserAndKey { .. } => &["uid", "send_key"],
        }
    }

    fn credentials(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::SingleToken { token } => vec![("token", token.as_str())],
            Self::UserAndKey { uid, send_key } => {
                vec![("uid", uid.as_str()), ("send_key", send_key.as_str())]
            }
        }
    }
}

impl std::fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleToken { .. } => f
                .debug_struct("SingleToken")
                .field("token", &"<redacted>")
                .finish(),
            Self::UserAndKey { .. } => f
                .debug_struct("UserAndKey")
                .field("uid", &"<redacted>")
                .field("send_key", &"<redacted>")
                .finish(),
        }
    }
}

/// One configured notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,

    #[serde(flatten)]
    pub kind: ProviderKind,

    pub template: String,
}

impl ProviderEndpoint {
    /// ServerChan-style endpoint keyed by a single token.
    pub fn single_token(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::SingleToken {
                token: token.into(),
            },
            template: SERVERCHAN_TEMPLATE.to_string(),
        }
    }

    /// ServerChan3-style endpoint keyed by user id + send key.
    pub fn user_and_key(
        name: impl Into<String>,
        uid: impl Into<String>,
        send_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::UserAndKey {
                uid: uid.into(),
                send_key: send_key.into(),
            },
            template: SERVERCHAN3_TEMPLATE.to_string(),
        }
    }

    /// Replace the URL template.
    #[cfg(test)]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Build the request URL for one delivery.  Pure: no I/O, no state.
    pub fn render_url(&self, title: &str, content: &str) -> String {
        let mut url = self.template.clone();
        for (name, value) in self.kind.credentials() {
            url = url.replace(&placeholder(name), value);
        }
        // Payload last: encoded text contains no braces, so it cannot be
        // mistaken for a placeholder.
        url.replace("{title}", &encode_component(title))
            .replace("{content}", &encode_component(content))
    }

    /// Check the template and credentials before any run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedTemplate {
            provider: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(malformed("provider name is empty".to_string()));
        }

        for (name, value) in self.kind.credentials() {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingCredential {
                    provider: self.name.clone(),
                    field: name.to_string(),
                });
            }
        }

        let allowed: Vec<&str> = PAYLOAD_PLACEHOLDERS
            .iter()
            .chain(self.kind.credential_placeholders())
            .copied()
            .collect();
        let found = placeholders_in(&self.template).map_err(malformed)?;

        for required in &allowed {
            if !found.iter().any(|p| p == required) {
                return Err(malformed(format!("missing {{{required}}} placeholder")));
            }
        }
        if let Some(unknown) = found.iter().find(|p| !allowed.contains(&p.as_str())) {
            return Err(malformed(format!("unknown placeholder {{{unknown}}}")));
        }

        let sample = self.render_url("title", "content");
        let parsed = url::Url::parse(&sample).map_err(|e| malformed(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(malformed(format!("unsupported scheme {}", parsed.scheme())));
        }

        Ok(())
    }
}

/// Form-urlencode a single payload field.
pub fn encode_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn placeholder(name: &str) -> String {
    format!("{{{name}}}")
}

/// Names of every `{...}` placeholder in `template`, in order.
fn placeholders_in(template: &str) -> Result<Vec<String>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if rest[..open].contains('}') {
            return Err("unmatched '}' in template".to_string());
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| "unterminated placeholder".to_string())?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(format!("invalid placeholder near {{{name}"));
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err("unmatched '}' in template".to_string());
    }
    Ok(names)
}
