use serde::Deserialize;

/// One challenge-catalogue entry (§3): immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    /// Path to the challenge's directory, relative to a worker's
    /// `base_path` (the `<challenge_path>` of §6's worker-side contract).
    pub path: String,
    /// Expected flag value, substituted into `run` and into the probe's
    /// `--flag=` argument (§2.2).
    pub flag: String,
    /// URL template containing `{{IP}}` and `{{PORT}}` placeholders.
    pub url: String,
}

impl Challenge {
    /// Render `self.url` with `ip`/`port` substituted (§4.H).
    pub fn render_url(&self, ip: &str, port: u16) -> String {
        self.url
            .replace("{{IP}}", ip)
            .replace("{{PORT}}", &port.to_string())
    }
}

/// Parameters needed to render a challenge's command templates for one
/// particular invocation, on one particular worker, on behalf of one
/// particular user.
pub struct ExecContext<'a> {
    pub base_path: &'a str,
    pub user_id: &'a str,
    pub hostname: &'a str,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_url_substitutes_both_placeholders() {
        let challenge = Challenge {
            id: "c".into(),
            name: "C".into(),
            path: "c".into(),
            flag: "flag{x}".into(),
            url: "http://{{IP}}:{{PORT}}/".into(),
        };
        assert_eq!(challenge.render_url("10.0.0.1", 9001), "http://10.0.0.1:9001/");
    }
}
