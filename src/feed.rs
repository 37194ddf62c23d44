//! Builds the dynamic feed document the revalidation set keeps fresh.
//!
//! Sources publish JSON documents of entries; the aggregator fetches each
//! configured source over the shared [`Transport`], scores entries for
//! relevance, drops stale and duplicate ones, and renders the single feed
//! document the app shell reads.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::net::Transport;
use crate::resource::ResourceRequest;

/// Entries scoring below this never make the feed.
const MIN_RELEVANCE: i64 = 1;
/// Penalty per off-topic marker, strong enough to sink single-keyword hits.
const NEGATIVE_PENALTY: i64 = 3;

/// What to aggregate and how to judge relevance.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPlan {
  /// Source document URLs to pull entries from.
  pub sources: Vec<String>,
  /// Domains sources must belong to. Empty means every source is trusted.
  #[serde(default)]
  pub allowed_domains: Vec<String>,
  /// Topic markers; each match in an entry's text counts toward its score.
  #[serde(default)]
  pub keywords: Vec<String>,
  /// Off-topic markers; each match costs [`NEGATIVE_PENALTY`].
  #[serde(default)]
  pub negative_keywords: Vec<String>,
  /// Domains whose entries get a flat score bonus.
  #[serde(default)]
  pub boosted_domains: Vec<String>,
  #[serde(default = "default_max_age_days")]
  pub max_age_days: i64,
  #[serde(default = "default_per_source_limit")]
  pub per_source_limit: usize,
  #[serde(default = "default_max_articles")]
  pub max_articles: usize,
}

fn default_max_age_days() -> i64 {
  7
}

fn default_per_source_limit() -> usize {
  15
}

fn default_max_articles() -> usize {
  100
}

/// One source's published document.
#[derive(Debug, Deserialize)]
struct SourceDocument {
  /// Display name; the source's domain stands in when absent.
  #[serde(default)]
  source: Option<String>,
  entries: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
  title: String,
  #[serde(default)]
  summary: String,
  url: String,
  published: Option<DateTime<Utc>>,
}

/// The rendered feed document, in the shape the app shell consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
  pub status: String,
  #[serde(rename = "totalResults")]
  pub total_results: usize,
  pub articles: Vec<Article>,
}

impl FeedDocument {
  /// Serialize for publishing as the feed resource body.
  pub fn to_json(&self) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(self)?)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
  pub source: ArticleSource,
  pub author: String,
  pub title: String,
  pub description: String,
  pub url: String,
  #[serde(rename = "publishedAt")]
  pub published_at: String,
  pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
  pub name: String,
}

struct Scored {
  score: i64,
  published: Option<DateTime<Utc>>,
  article: Article,
}

/// Fetches every planned source and distills one ranked feed document.
///
/// Sources are independent: an unreachable or malformed source is logged and
/// skipped, and the document builds from whatever the rest yielded.
pub struct FeedAggregator {
  transport: Arc<dyn Transport>,
  plan: FeedPlan,
}

impl FeedAggregator {
  pub fn new(transport: Arc<dyn Transport>, plan: FeedPlan) -> Self {
    Self { transport, plan }
  }

  pub async fn build(&self) -> Result<FeedDocument> {
    let now = Utc::now();
    let mut scored: Vec<Scored> = Vec::new();

    for source in &self.plan.sources {
      let url = match Url::parse(source) {
        Ok(url) => url,
        Err(e) => {
          warn!(source = %source, error = %e, "Skipping unparseable source URL");
          continue;
        }
      };
      if !self.source_allowed(&url) {
        info!(source = %source, "Skipping source outside the allowlist");
        continue;
      }
      match self.fetch_source(source).await {
        Ok(document) => {
          let name = document
            .source
            .clone()
            .unwrap_or_else(|| domain_label(&url));
          for entry in document.entries.iter().take(self.plan.per_source_limit) {
            if let Some(published) = entry.published {
              if (now - published).num_days() > self.plan.max_age_days {
                continue;
              }
            }
            let score = self.relevance(entry, &url, now);
            if score < MIN_RELEVANCE {
              debug!(url = %entry.url, score, "Dropping low-relevance entry");
              continue;
            }
            scored.push(Scored {
              score,
              published: entry.published,
              article: self.render_article(entry, &name, now),
            });
          }
        }
        Err(e) => {
          warn!(source = %source, error = %e, "Skipping unreachable source");
        }
      }
    }

    dedup(&mut scored);
    scored.sort_by(|a, b| (b.score, b.published).cmp(&(a.score, a.published)));
    scored.truncate(self.plan.max_articles);

    let articles: Vec<Article> = scored.into_iter().map(|s| s.article).collect();
    info!(articles = articles.len(), "Feed document built");

    Ok(FeedDocument {
      status: "ok".to_string(),
      total_results: articles.len(),
      articles,
    })
  }

  async fn fetch_source(&self, source: &str) -> Result<SourceDocument> {
    let snapshot = self.transport.fetch(ResourceRequest::get(source)?).await?;
    if !snapshot.is_ok() {
      return Err(eyre!("Unexpected status {}", snapshot.status));
    }
    Ok(serde_json::from_slice(&snapshot.body)?)
  }

  fn source_allowed(&self, url: &Url) -> bool {
    if self.plan.allowed_domains.is_empty() {
      return true;
    }
    let host = url.host_str().unwrap_or_default();
    self
      .plan
      .allowed_domains
      .iter()
      .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
  }

  fn relevance(&self, entry: &SourceEntry, source: &Url, now: DateTime<Utc>) -> i64 {
    let text = format!("{} {}", entry.title, entry.summary).to_lowercase();

    let matches = self
      .plan
      .keywords
      .iter()
      .filter(|k| text.contains(&k.to_lowercase()))
      .count() as i64;
    let mut score = matches;

    for negative in &self.plan.negative_keywords {
      if text.contains(&negative.to_lowercase()) {
        score -= NEGATIVE_PENALTY;
      }
    }

    let host = source.host_str().unwrap_or_default();
    if self.plan.boosted_domains.iter().any(|d| host.contains(d.as_str())) {
      score += 2;
    }

    if matches >= 3 {
      score += 2;
    } else if matches >= 2 {
      score += 1;
    }

    if let Some(published) = entry.published {
      let days_old = (now - published).num_days();
      if days_old <= 1 {
        score += 2;
      } else if days_old <= 3 {
        score += 1;
      }
    }

    score.max(0)
  }

  fn render_article(&self, entry: &SourceEntry, source_name: &str, now: DateTime<Utc>) -> Article {
    let description = clean_description(&entry.summary);
    Article {
      source: ArticleSource {
        name: source_name.to_string(),
      },
      author: source_name.to_string(),
      title: entry.title.clone(),
      description: description.clone(),
      url: entry.url.clone(),
      published_at: entry.published.unwrap_or(now).to_rfc3339(),
      content: description.chars().take(200).collect(),
    }
  }
}

/// Drop entries sharing a URL (query ignored) or a title with an earlier one.
fn dedup(scored: &mut Vec<Scored>) {
  let mut seen_urls: BTreeSet<String> = BTreeSet::new();
  let mut seen_titles: BTreeSet<String> = BTreeSet::new();
  scored.retain(|s| {
    let url = s.article.url.split('?').next().unwrap_or_default();
    let url_hash = digest(url);
    let title_hash = digest(s.article.title.to_lowercase().trim());
    if seen_urls.contains(&url_hash) || seen_titles.contains(&title_hash) {
      return false;
    }
    seen_urls.insert(url_hash);
    seen_titles.insert(title_hash);
    true
  });
}

fn digest(text: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(text.as_bytes());
  hex::encode(hasher.finalize())
}

/// Short display name from a source's domain: `www.greenbiz.com` becomes
/// `Greenbiz`.
fn domain_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or_default();
  let label = host
    .strip_prefix("www.")
    .unwrap_or(host)
    .split('.')
    .next()
    .unwrap_or_default();
  let mut chars = label.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Strip markup and keep the first sentence, or a hard cut near 100 chars.
fn clean_description(raw: &str) -> String {
  let text = strip_tags(raw);
  let text = text.trim();

  if let Some(dot) = text.find('.') {
    if dot < 100 {
      return text[..=dot].to_string();
    }
  }
  if text.chars().count() <= 100 {
    text.to_string()
  } else {
    let cut: String = text.chars().take(97).collect();
    format!("{}...", cut)
  }
}

fn strip_tags(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut in_tag = false;
  for c in raw.chars() {
    match c {
      '<' => in_tag = true,
      '>' => in_tag = false,
      _ if !in_tag => out.push(c),
      _ => {}
    }
  }
  out
}
