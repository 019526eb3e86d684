//! robots.txt compliance.
//!
//! Before a source URL is fetched, `<scheme>://<host>/robots.txt` is
//! retrieved and evaluated for the outbound user-agent. The check
//! fails open: an unreachable or unparseable robots.txt never blocks a
//! fetch. A denial is reported to the caller without any request being
//! issued for the source URL.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

/// Verdict for one source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsVerdict {
    Allowed,
    /// Denied for this user-agent; carries the agent string for the
    /// error message.
    Denied(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    path: String,
}

#[derive(Debug, Clone)]
struct Group {
    /// Lowercased user-agent tokens this group applies to.
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed rules of one robots.txt file.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

impl RobotsPolicy {
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // Consecutive User-agent lines share the following rule block.
        let mut agents_open = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if agents_open {
                        if let Some(group) = current.as_mut() {
                            group.agents.push(value.to_ascii_lowercase());
                        }
                    } else {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group {
                            agents: vec![value.to_ascii_lowercase()],
                            rules: Vec::new(),
                        });
                        agents_open = true;
                    }
                }
                "allow" | "disallow" => {
                    agents_open = false;
                    if let Some(group) = current.as_mut() {
                        group.rules.push(Rule {
                            allow: field == "allow",
                            path: value.to_owned(),
                        });
                    }
                }
                // crawl-delay, sitemap, etc. are irrelevant here but
                // still close an agent list.
                _ => agents_open = false,
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        Self { groups }
    }

    /// Evaluate a request path for a user-agent.
    ///
    /// Group selection picks the group with the longest agent token
    /// contained in the user-agent (case-insensitive), falling back to
    /// `*`. Within the group the first rule whose path prefixes the
    /// request path decides; no match means allowed. An empty
    /// `Disallow:` allows everything.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let ua = user_agent.to_ascii_lowercase();

        let mut selected: Option<(&Group, usize)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                let specificity = if agent == "*" {
                    Some(0)
                } else if ua.contains(agent.as_str()) {
                    Some(agent.len())
                } else {
                    None
                };
                if let Some(s) = specificity {
                    if selected.map_or(true, |(_, best)| s > best) {
                        selected = Some((group, s));
                    }
                }
            }
        }

        let Some((group, _)) = selected else {
            return true;
        };

        for rule in &group.rules {
            if rule.path.is_empty() {
                if !rule.allow {
                    // "Disallow:" with no value allows everything.
                    return true;
                }
                continue;
            }
            if path.starts_with(&rule.path) {
                return rule.allow;
            }
        }
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetches and caches robots.txt per host for the life of the fetch
/// layer.
pub struct RobotsGate {
    client: reqwest::Client,
    /// host:port → policy; `None` caches an unreachable robots.txt so
    /// the fail-open outcome is not re-fetched every cycle.
    cache: Mutex<HashMap<String, Option<RobotsPolicy>>>,
}

impl RobotsGate {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `url` may be fetched as `user_agent`.
    pub async fn check(&self, url: &str, user_agent: &str) -> RobotsVerdict {
        let Ok(parsed) = Url::parse(url) else {
            // Unparseable URLs fail at request time with a better error.
            return RobotsVerdict::Allowed;
        };
        let Some(host) = parsed.host_str() else {
            return RobotsVerdict::Allowed;
        };
        let cache_key = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };

        let cached = self.cache.lock().get(&cache_key).cloned();
        let policy = match cached {
            Some(policy) => policy,
            None => {
                let robots_url = format!("{cache_key}/robots.txt");
                let fetched = self.fetch_policy(&robots_url).await;
                if fetched.is_none() {
                    tracing::debug!(url = %robots_url, "robots.txt unavailable, failing open");
                }
                self.cache.lock().insert(cache_key, fetched.clone());
                fetched
            }
        };

        match policy {
            Some(policy) if !policy.is_allowed(user_agent, parsed.path()) => {
                tracing::warn!(url, user_agent, "blocked by robots.txt");
                RobotsVerdict::Denied(user_agent.to_owned())
            }
            _ => RobotsVerdict::Allowed,
        }
    }

    async fn fetch_policy(&self, robots_url: &str) -> Option<RobotsPolicy> {
        let response = self.client.get(robots_url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let text = response.text().await.ok()?;
        Some(RobotsPolicy::parse(&text))
    }
}

impl Default for RobotsGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# policy file
User-agent: *
Disallow: /private/
Allow: /

User-agent: policywatch
Disallow: /internal/
";

    #[test]
    fn wildcard_group_blocks_private() {
        let policy = RobotsPolicy::parse(ROBOTS);
        assert!(!policy.is_allowed("SomeBot/2.0", "/private/page"));
        assert!(policy.is_allowed("SomeBot/2.0", "/public"));
    }

    #[test]
    fn specific_group_wins_over_wildcard() {
        let policy = RobotsPolicy::parse(ROBOTS);
        // The policywatch group has no /private/ rule.
        assert!(policy.is_allowed("policywatch/0.1", "/private/page"));
        assert!(!policy.is_allowed("policywatch/0.1", "/internal/page"));
    }

    #[test]
    fn no_groups_allows_everything() {
        let policy = RobotsPolicy::parse("");
        assert!(policy.is_allowed("anything", "/any/path"));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow:\n");
        assert!(policy.is_allowed("bot", "/anything"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let policy = RobotsPolicy::parse("User-agent: *\nAllow: /docs/public\nDisallow: /docs/\n");
        assert!(policy.is_allowed("bot", "/docs/public/page"));
        assert!(!policy.is_allowed("bot", "/docs/secret"));
    }

    #[test]
    fn shared_agent_lines_share_rules() {
        let policy =
            RobotsPolicy::parse("User-agent: alpha\nUser-agent: beta\nDisallow: /x/\n");
        assert!(!policy.is_allowed("alpha/1.0", "/x/y"));
        assert!(!policy.is_allowed("beta/1.0", "/x/y"));
        assert!(policy.is_allowed("gamma/1.0", "/x/y"));
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let policy = RobotsPolicy::parse("# nothing\n\nUser-agent: * # inline\nDisallow: /a\n");
        assert!(!policy.is_allowed("bot", "/a/b"));
    }
}
