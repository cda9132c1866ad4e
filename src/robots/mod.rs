//! robots.txt handling
//!
//! Wraps the `robotstxt` matcher with an allow-all fallback for missing or
//! unfetchable files, and extracts the `Sitemap:` and `Crawl-delay:`
//! directives the matcher does not surface. Rules are cached per host for
//! the lifetime of one crawl by the robots middleware.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt rules for one host.
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty means allow all)
    content: String,
    /// Bypass parsing and allow everything
    allow_all: bool,
}

impl RobotsRules {
    /// Wraps raw robots.txt content.
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Permissive rules used when robots.txt cannot be fetched or parsed.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks whether `url` may be fetched by `user_agent`.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Sitemap URLs declared in the file, in order of appearance.
    pub fn sitemaps(&self) -> Vec<String> {
        let mut sitemaps = Vec::new();
        for line in self.content.lines() {
            let trimmed = line.trim();
            if trimmed.len() >= 8 && trimmed.as_bytes()[..8].eq_ignore_ascii_case(b"sitemap:") {
                let value = trimmed[8..].trim();
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            }
        }
        sitemaps
    }

    /// Crawl delay in seconds for `user_agent`, preferring an exact
    /// user-agent group over the wildcard group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();
        let mut current_agents: Vec<String> = Vec::new();
        let mut wildcard_delay: Option<f64> = None;
        let mut agent_delay: Option<f64> = None;

        for line in self.content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => current_agents.push(value.to_lowercase()),
                "crawl-delay" => {
                    if let Ok(delay) = value.parse::<f64>() {
                        if current_agents
                            .iter()
                            .any(|ua| ua == "*" || normalized_agent.contains(ua.as_str()))
                        {
                            if current_agents.iter().any(|ua| ua == "*") {
                                wildcard_delay = Some(delay);
                            } else {
                                agent_delay = Some(delay);
                            }
                        }
                    }
                    current_agents.clear();
                }
                _ => {}
            }
        }

        agent_delay.or(wildcard_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let rules = RobotsRules::allow_all();
        assert!(rules.is_allowed("/any/path", "Feedsearch Bot"));
        assert!(rules.is_allowed("/private/", "Feedsearch Bot"));
    }

    #[test]
    fn test_empty_content_allows() {
        let rules = RobotsRules::from_content("");
        assert!(rules.is_allowed("/page", "Feedsearch Bot"));
    }

    #[test]
    fn test_disallow_path() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /private/");
        assert!(rules.is_allowed("/", "Feedsearch Bot"));
        assert!(rules.is_allowed("/blog", "Feedsearch Bot"));
        assert!(!rules.is_allowed("/private/feed.xml", "Feedsearch Bot"));
    }

    #[test]
    fn test_disallow_everything() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /");
        assert!(!rules.is_allowed("/", "Feedsearch Bot"));
        assert!(!rules.is_allowed("/feed", "Feedsearch Bot"));
    }

    #[test]
    fn test_agent_specific_group() {
        let rules =
            RobotsRules::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(rules.is_allowed("/page", "Feedsearch Bot"));
        assert!(!rules.is_allowed("/page", "BadBot"));
    }

    #[test]
    fn test_sitemaps_extracted() {
        let rules = RobotsRules::from_content(
            "User-agent: *\nDisallow: /admin\nSitemap: https://example.com/sitemap.xml\nsitemap: https://example.com/news.xml",
        );
        assert_eq!(
            rules.sitemaps(),
            vec![
                "https://example.com/sitemap.xml".to_string(),
                "https://example.com/news.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_no_sitemaps() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow:");
        assert!(rules.sitemaps().is_empty());
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let rules = RobotsRules::from_content("User-agent: *\nCrawl-delay: 2.5");
        assert_eq!(rules.crawl_delay("Feedsearch Bot"), Some(2.5));
    }

    #[test]
    fn test_crawl_delay_prefers_specific_agent() {
        let rules = RobotsRules::from_content(
            "User-agent: feedsearch\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10",
        );
        assert_eq!(rules.crawl_delay("Feedsearch Bot"), Some(5.0));
        assert_eq!(rules.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_absent() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /admin");
        assert_eq!(rules.crawl_delay("Feedsearch Bot"), None);
    }

    #[test]
    fn test_crawl_delay_multiple_agents_in_group() {
        let rules = RobotsRules::from_content("User-agent: bota\nUser-agent: botb\nCrawl-delay: 3");
        assert_eq!(rules.crawl_delay("BotA"), Some(3.0));
        assert_eq!(rules.crawl_delay("BotB"), Some(3.0));
        assert_eq!(rules.crawl_delay("BotC"), None);
    }
}
