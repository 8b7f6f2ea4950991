use chrono::{DateTime, Local};
use url::Url;

use crate::{
    constants::INTERNAL_SCHEMES,
    domain::{Blocklist, WorkHours, normalize_host},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub is_distracting: bool,
    pub in_work_hours: bool,
    /// `None` when there is no active site (no tab, browser-internal page, unparseable url).
    pub site: Option<String>,
}

impl Verdict {
    pub fn has_site(&self) -> bool {
        self.site.is_some()
    }

    pub fn site_id(&self) -> &str {
        self.site.as_deref().unwrap_or("")
    }
}

/// Site identity of a tab url: its host without a leading `www.`.
pub fn site_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if INTERNAL_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }
    Some(normalize_host(parsed.host_str().unwrap_or("")))
}

pub fn classify(
    url: Option<&str>,
    blocklist: &Blocklist,
    work_hours: &WorkHours,
    now: &DateTime<Local>,
) -> Verdict {
    let site = url.and_then(site_of);
    let is_distracting = site.as_deref().is_some_and(|host| blocklist.matches(host));

    Verdict {
        is_distracting,
        in_work_hours: work_hours.contains(now),
        site,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn wednesday_noon() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 3, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_blocked_subdomain_is_distracting() {
        let verdict = classify(
            Some("https://www.old.reddit.com/r/rust"),
            &Blocklist::default(),
            &WorkHours::default(),
            &wednesday_noon(),
        );

        assert!(verdict.is_distracting);
        assert!(verdict.in_work_hours);
        assert_eq!(verdict.site_id(), "old.reddit.com");
    }

    #[test]
    fn test_leading_www_is_stripped() {
        assert_eq!(site_of("https://www.github.com/x"), Some("github.com".into()));
        assert_eq!(site_of("http://WWW.Example.org:8080"), Some("example.org".into()));
    }

    #[test]
    fn test_internal_pages_have_no_site() {
        let blocklist = Blocklist::new(["newtab"]);
        for url in [
            "chrome://newtab/",
            "about:blank",
            "chrome-extension://abcdef/popup.html",
            "moz-extension://abcdef/popup.html",
        ] {
            let verdict = classify(
                Some(url),
                &blocklist,
                &WorkHours::default(),
                &wednesday_noon(),
            );
            assert!(!verdict.has_site(), "{url}");
            assert!(!verdict.is_distracting, "{url}");
        }
    }

    #[test]
    fn test_missing_or_garbage_url_has_no_site() {
        let now = wednesday_noon();
        let none = classify(None, &Blocklist::default(), &WorkHours::default(), &now);
        let junk = classify(
            Some("not a url"),
            &Blocklist::default(),
            &WorkHours::default(),
            &now,
        );
        assert!(!none.has_site());
        assert!(!junk.has_site());
    }

    #[test]
    fn test_focused_site_outside_work_hours() {
        let evening = Local
            .with_ymd_and_hms(2024, 1, 3, 21, 0, 0)
            .single()
            .expect("unambiguous local time");
        let verdict = classify(
            Some("https://docs.rs"),
            &Blocklist::default(),
            &WorkHours::default(),
            &evening,
        );
        assert!(!verdict.is_distracting);
        assert!(!verdict.in_work_hours);
        assert!(verdict.has_site());
    }
}
