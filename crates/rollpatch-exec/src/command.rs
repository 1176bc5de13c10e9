//! Argument-list command construction
//!
//! Commands are assembled as `(program, args)` token lists and rendered to
//! a single command line only at the transport boundary, with each token
//! shell-quoted. Callers never interpolate values into format strings.

/// A remote command built from discrete tokens.
#[derive(Debug, Clone)]
pub struct Cmd {
    env: Vec<(String, String)>,
    tokens: Vec<String>,
    sudo: bool,
}

impl Cmd {
    /// Start a command with the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            env: Vec::new(),
            tokens: vec![program.into()],
            sudo: false,
        }
    }

    /// Append a single argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.tokens.push(arg.into());
        self
    }

    /// Append multiple arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix an environment assignment (rendered as `KEY=value cmd ...`)
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the command through sudo when `use_sudo` is set
    #[must_use]
    pub fn sudo_if(mut self, use_sudo: bool) -> Self {
        self.sudo = use_sudo;
        self
    }

    /// Render to a single shell command line with each token quoted
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.tokens.len() + 2);

        if self.sudo {
            parts.push("sudo".to_string());
            // sudo -E would leak the caller environment; assignments go
            // through `env` instead so they survive the privilege switch
            if !self.env.is_empty() {
                parts.push("env".to_string());
            }
        }

        for (key, value) in &self.env {
            parts.push(format!("{key}={}", shell_quote(value)));
        }

        parts.extend(self.tokens.iter().map(|t| shell_quote(t)));
        parts.join(" ")
    }
}

/// Quote a token for POSIX sh if it contains anything outside the safe set
fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+%@,".contains(c));

    if safe {
        token.to_string()
    } else {
        // single-quote, escaping embedded single quotes
        format!("'{}'", token.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tokens_unquoted() {
        let cmd = Cmd::new("apt-get").args(["full-upgrade", "-y"]);
        assert_eq!(cmd.render(), "apt-get full-upgrade -y");
    }

    #[test]
    fn test_unsafe_token_quoted() {
        let cmd = Cmd::new("echo").arg("hello world; rm -rf /");
        assert_eq!(cmd.render(), "echo 'hello world; rm -rf /'");
    }

    #[test]
    fn test_embedded_single_quote() {
        let cmd = Cmd::new("echo").arg("it's");
        assert_eq!(cmd.render(), "echo 'it'\\''s'");
    }

    #[test]
    fn test_env_prefix() {
        let cmd = Cmd::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .arg("full-upgrade");
        assert_eq!(
            cmd.render(),
            "DEBIAN_FRONTEND=noninteractive apt-get full-upgrade"
        );
    }

    #[test]
    fn test_sudo_with_env_uses_env_wrapper() {
        let cmd = Cmd::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .arg("full-upgrade")
            .sudo_if(true);
        assert_eq!(
            cmd.render(),
            "sudo env DEBIAN_FRONTEND=noninteractive apt-get full-upgrade"
        );
    }

    #[test]
    fn test_sudo_disabled() {
        let cmd = Cmd::new("shutdown").args(["-r", "+1"]).sudo_if(false);
        assert_eq!(cmd.render(), "shutdown -r +1");
    }
}
