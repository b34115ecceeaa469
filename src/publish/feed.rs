//! RSS feed and sitemap documents kept next to the published articles.
//!
//! Both are spliced textually: existing entries are preserved byte-for-byte, new entries
//! go in, the oldest fall out past the cap.

use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<item>.*?</item>").unwrap());
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<url>.*?</url>").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<link>(.*?)</link>").unwrap());
static RE_LOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>(.*?)</loc>").unwrap());

fn xml_text(s: &str) -> String {
    html_escape::encode_text(s).to_string()
}

/// Entry to add to the feed and sitemap for one published article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published: DateTime<Utc>,
}

pub fn base_feed(title: &str, description: &str, site_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <description>{}</description>\n    <link>{}</link>\n    <language>en-US</language>\n  </channel>\n</rss>\n",
        xml_text(title),
        xml_text(description),
        xml_text(site_url),
    )
}

pub fn feed_item(entry: &FeedEntry) -> String {
    let url = xml_text(&entry.url);
    format!(
        "<item>\n      <title>{}</title>\n      <description>{}</description>\n      <link>{url}</link>\n      <pubDate>{}</pubDate>\n      <guid>{url}</guid>\n    </item>",
        xml_text(&entry.title),
        xml_text(&entry.description),
        entry.published.to_rfc2822(),
    )
}

/// Insert `entries` newest-first ahead of the existing items and keep at most `max`.
/// Existing items pointing at a re-published URL are replaced.
pub fn splice_feed(existing: &str, entries: &[FeedEntry], max: usize) -> Result<String> {
    let Some(close) = existing.rfind("</channel>") else {
        bail!("feed document has no </channel>");
    };
    let (body, tail) = existing.split_at(close);

    let new_urls: HashSet<String> = entries.iter().map(|e| xml_text(&e.url)).collect();
    let mut fresh: Vec<&FeedEntry> = entries.iter().collect();
    fresh.sort_by(|a, b| b.published.cmp(&a.published));

    let mut items: Vec<String> = fresh.into_iter().map(feed_item).collect();
    items.extend(
        RE_ITEM
            .find_iter(body)
            .map(|m| m.as_str())
            .filter(|item| {
                RE_LINK
                    .captures(item)
                    .map(|c| !new_urls.contains(c[1].trim()))
                    .unwrap_or(true)
            })
            .map(str::to_string),
    );
    items.truncate(max);

    let head = RE_ITEM.replace_all(body, "");
    let head = collapse_blank_lines(head.trim_end());
    let mut out = head;
    for item in &items {
        out.push_str("\n    ");
        out.push_str(item);
    }
    out.push_str("\n  ");
    out.push_str(tail);
    Ok(out)
}

pub fn base_sitemap(site_url: &str, now: DateTime<Utc>) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n  {}\n</urlset>\n",
        sitemap_url(site_url, now, "daily", "1.0"),
    )
}

fn sitemap_url(loc: &str, lastmod: DateTime<Utc>, changefreq: &str, priority: &str) -> String {
    format!(
        "<url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>{changefreq}</changefreq>\n    <priority>{priority}</priority>\n  </url>",
        xml_text(loc),
        lastmod.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

/// Append article URLs (deduplicated by `<loc>`), keep at most `max`, evicting the oldest
/// article URLs first. The site root entry is never evicted.
pub fn splice_sitemap(
    existing: &str,
    urls: &[String],
    site_url: &str,
    now: DateTime<Utc>,
    max: usize,
) -> Result<String> {
    let Some(close) = existing.rfind("</urlset>") else {
        bail!("sitemap document has no </urlset>");
    };
    let (body, tail) = existing.split_at(close);

    let new_locs: HashSet<String> = urls.iter().map(|u| xml_text(u)).collect();
    let root = xml_text(site_url);
    let loc_of = |entry: &str| RE_LOC.captures(entry).map(|c| c[1].trim().to_string());

    let mut entries: Vec<String> = RE_URL
        .find_iter(body)
        .map(|m| m.as_str().to_string())
        .filter(|e| loc_of(e).map(|l| !new_locs.contains(&l)).unwrap_or(true))
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    for u in urls {
        if seen.insert(u.clone()) {
            entries.push(sitemap_url(u, now, "monthly", "0.8"));
        }
    }

    while entries.len() > max {
        let evict = entries
            .iter()
            .position(|e| loc_of(e).as_deref() != Some(root.as_str()));
        match evict {
            Some(i) => {
                entries.remove(i);
            }
            None => break,
        }
    }

    let head = RE_URL.replace_all(body, "");
    let mut out = collapse_blank_lines(head.trim_end());
    for e in &entries {
        out.push_str("\n  ");
        out.push_str(e);
    }
    out.push('\n');
    out.push_str(tail);
    Ok(out)
}

fn collapse_blank_lines(s: &str) -> String {
    s.lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(n: i64) -> FeedEntry {
        FeedEntry {
            title: format!("Story {n} & more"),
            description: "<b>desc</b>".into(),
            url: format!("https://agaminews.in/blog/2025-10-14-story-{n}"),
            published: Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap() + Duration::minutes(n),
        }
    }

    #[test]
    fn new_items_go_first_and_are_escaped() {
        let base = base_feed("Tech News Blog", "Latest", "https://agaminews.in");
        let once = splice_feed(&base, &[entry(1)], 50).unwrap();
        let twice = splice_feed(&once, &[entry(2), entry(3)], 50).unwrap();

        let links: Vec<String> = RE_LINK.captures_iter(&twice).map(|c| c[1].to_string()).collect();
        assert_eq!(links[0], "https://agaminews.in");
        assert!(links[1].ends_with("story-3"));
        assert!(links[2].ends_with("story-2"));
        assert!(links[3].ends_with("story-1"));
        assert!(twice.contains("Story 3 &amp; more"));
        assert!(twice.contains("&lt;b&gt;desc&lt;/b&gt;"));
        assert!(twice.trim_end().ends_with("</channel>\n</rss>"));
    }

    #[test]
    fn feed_is_capped() {
        let mut doc = base_feed("T", "D", "https://agaminews.in");
        for n in 0..5 {
            doc = splice_feed(&doc, &[entry(n)], 3).unwrap();
        }
        assert_eq!(RE_ITEM.find_iter(&doc).count(), 3);
        assert!(doc.contains("story-4"));
        assert!(!doc.contains("story-1<"));
    }

    #[test]
    fn republished_url_replaces_old_item() {
        let base = base_feed("T", "D", "https://agaminews.in");
        let doc = splice_feed(&base, &[entry(1)], 50).unwrap();
        let doc = splice_feed(&doc, &[entry(1)], 50).unwrap();
        assert_eq!(RE_ITEM.find_iter(&doc).count(), 1);
    }

    #[test]
    fn sitemap_dedups_and_keeps_root() {
        let now = Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap();
        let root = "https://agaminews.in";
        let mut doc = base_sitemap(root, now);
        let u = |n: u32| format!("{root}/blog/a-{n}");
        doc = splice_sitemap(&doc, &[u(1), u(1), u(2)], root, now, 3).unwrap();
        assert_eq!(RE_URL.find_iter(&doc).count(), 3);
        doc = splice_sitemap(&doc, &[u(2), u(3)], root, now, 3).unwrap();
        let locs: Vec<String> = RE_LOC.captures_iter(&doc).map(|c| c[1].to_string()).collect();
        assert_eq!(locs, vec![root.to_string(), u(2), u(3)]);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(splice_feed("<rss>", &[entry(1)], 5).is_err());
        assert!(splice_sitemap("<urlset>", &[], "x", Utc::now(), 5).is_err());
    }
}
