//! Episode list from the Apollo cache embedded in a table-of-contents page's `__NEXT_DATA__`.
//!
//! The cache is a flat store keyed `<Type>:<id>`. Records point at each other with
//! `{"__ref": "<key>"}` objects, which are resolved by looking the key up in the same store.

use crate::model::{sort_by_published, Episode};
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

const WORK_PREFIX: &str = "Work:";
const EPISODE_PREFIX: &str = "Episode:";

#[derive(Debug, Default, Deserialize)]
struct NextData {
    #[serde(default)]
    props: Props,
}

#[derive(Debug, Default, Deserialize)]
struct Props {
    #[serde(rename = "pageProps", default)]
    page_props: PageProps,
}

#[derive(Debug, Default, Deserialize)]
struct PageProps {
    #[serde(rename = "__APOLLO_STATE__", default)]
    apollo_state: Option<Map<String, Value>>,
}

/// Key of another record in the same store.
#[derive(Debug, Clone, Deserialize)]
pub struct Ref {
    #[serde(rename = "__ref")]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub work: Option<Ref>,
}

/// A cache record, typed by its key prefix.
#[derive(Debug, Clone)]
pub enum Record {
    Work(WorkRecord),
    Episode { key_id: String, record: EpisodeRecord },
    Other,
}

/// The Apollo store in document order, with a key index for `__ref` lookups.
#[derive(Debug, Default)]
pub struct ApolloStore {
    records: Vec<(String, Record)>,
    index: HashMap<String, usize>,
}

impl ApolloStore {
    /// Parse the `__NEXT_DATA__` JSON text. A page without Apollo state yields an empty store.
    pub fn from_next_data(json: &str) -> Result<Self, serde_json::Error> {
        let data: NextData = serde_json::from_str(json)?;
        let state = data.props.page_props.apollo_state.unwrap_or_default();
        let mut store = ApolloStore::default();
        for (key, value) in state {
            let record = classify(&key, value);
            store.index.insert(key.clone(), store.records.len());
            store.records.push((key, record));
        }
        Ok(store)
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.records[i].1)
    }

    /// Id of the first work record in the store.
    pub fn work_id(&self) -> Option<&str> {
        self.records.iter().find_map(|(_, r)| match r {
            Record::Work(w) => w.id.as_deref(),
            _ => None,
        })
    }

    fn episodes(&self) -> impl Iterator<Item = (&str, &EpisodeRecord)> {
        self.records.iter().filter_map(|(_, r)| match r {
            Record::Episode { key_id, record } => Some((key_id.as_str(), record)),
            _ => None,
        })
    }

    /// Work id an episode belongs to: its `work` reference when it resolves, else `fallback`.
    fn owning_work_id<'a>(
        &'a self,
        record: &EpisodeRecord,
        fallback: Option<&'a str>,
    ) -> Option<&'a str> {
        let resolved = record
            .work
            .as_ref()
            .and_then(|r| self.get(&r.key))
            .and_then(|r| match r {
                Record::Work(w) => w.id.as_deref(),
                _ => None,
            });
        resolved.or(fallback).filter(|id| !id.is_empty())
    }

    /// Episodes with a title and an owning work, URLs built as `<toc_url>/episodes/<id>`.
    ///
    /// Sorted by `publishedAt` when every kept episode has one; otherwise document order.
    pub fn to_episodes(&self, toc_url: &str) -> Vec<Episode> {
        let base = toc_url.trim_end_matches('/');
        let work_id = self.work_id();
        let mut episodes: Vec<Episode> = self
            .episodes()
            .filter_map(|(key_id, record)| {
                let title = record.title.as_deref().map(str::trim).unwrap_or_default();
                if title.is_empty() {
                    return None;
                }
                self.owning_work_id(record, work_id)?;
                let id = record.id.as_deref().unwrap_or(key_id);
                Some(Episode {
                    title: title.to_string(),
                    url: format!("{}/episodes/{}", base, id),
                    published_at: record.published_at.clone().filter(|s| !s.is_empty()),
                })
            })
            .collect();
        sort_by_published(&mut episodes);
        episodes
    }
}

/// Type a record by its key prefix. A record whose fields do not fit its type is kept as Other.
fn classify(key: &str, value: Value) -> Record {
    let typed = if key.starts_with(WORK_PREFIX) {
        serde_json::from_value(value).map(Record::Work)
    } else {
        match key.strip_prefix(EPISODE_PREFIX) {
            Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
                serde_json::from_value(value).map(|record| Record::Episode {
                    key_id: id.to_string(),
                    record,
                })
            }
            _ => return Record::Other,
        }
    };
    typed.unwrap_or_else(|e| {
        tracing::debug!(%key, error = %e, "unexpected record shape");
        Record::Other
    })
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Text of the `<script id="__NEXT_DATA__">` element in a page, if present.
pub fn next_data_from_html(html: &str) -> Option<String> {
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let doc = Html::parse_document(html);
    let text = doc
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>());
    text.filter(|t| !t.trim().is_empty())
}

/// Episodes from `__NEXT_DATA__` JSON text. Any parse failure yields an empty list.
pub fn episodes_from_next_data(json: &str, toc_url: &str) -> Vec<Episode> {
    match ApolloStore::from_next_data(json) {
        Ok(store) => store.to_episodes(toc_url),
        Err(e) => {
            tracing::debug!(error = %e, "could not parse __NEXT_DATA__");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOC: &str = "https://kakuyomu.jp/works/1177354054880000000";

    fn next_data(state: &str) -> String {
        format!(r#"{{"props":{{"pageProps":{{"__APOLLO_STATE__":{}}}}}}}"#, state)
    }

    #[test]
    fn builds_urls_and_sorts_by_published_at() {
        let json = next_data(
            r#"{
            "Work:1177354054880000000": {"__typename":"Work","id":"1177354054880000000","title":"作品"},
            "Episode:300": {"__typename":"Episode","id":"300","title":"第三話","publishedAt":"2020-03-01T00:00:00Z","work":{"__ref":"Work:1177354054880000000"}},
            "Episode:100": {"__typename":"Episode","id":"100","title":"第一話","publishedAt":"2020-01-01T00:00:00Z","work":{"__ref":"Work:1177354054880000000"}},
            "Episode:200": {"__typename":"Episode","id":"200","title":"第二話","publishedAt":"2020-02-01T00:00:00Z","work":{"__ref":"Work:1177354054880000000"}},
            "UserAccount:9": {"__typename":"UserAccount","id":"9"}
        }"#,
        );
        let eps = episodes_from_next_data(&json, TOC);
        let titles: Vec<_> = eps.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["第一話", "第二話", "第三話"]);
        assert_eq!(eps[0].url, format!("{}/episodes/100", TOC));
        assert_eq!(eps[0].published_at.as_deref(), Some("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn keeps_document_order_when_timestamp_missing() {
        let json = next_data(
            r#"{
            "Work:1": {"id":"1"},
            "Episode:30": {"id":"30","title":"c","publishedAt":"2020-03-01"},
            "Episode:10": {"id":"10","title":"a"},
            "Episode:20": {"id":"20","title":"b","publishedAt":"2020-02-01"}
        }"#,
        );
        let eps = episodes_from_next_data(&json, TOC);
        let titles: Vec<_> = eps.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["c", "a", "b"]);
    }

    #[test]
    fn skips_untitled_and_orphan_episodes() {
        let json = next_data(
            r#"{
            "Episode:1": {"id":"1","title":"no work anywhere"},
            "Episode:2": {"id":"2","title":""}
        }"#,
        );
        assert!(episodes_from_next_data(&json, TOC).is_empty());
    }

    #[test]
    fn resolves_work_reference_through_store() -> Result<(), serde_json::Error> {
        let json = next_data(
            r#"{
            "Episode:5": {"id":"5","title":"t","work":{"__ref":"Work:77"}},
            "Work:77": {"id":77}
        }"#,
        );
        let store = ApolloStore::from_next_data(&json)?;
        assert_eq!(store.work_id(), Some("77"));
        assert!(matches!(store.get("Work:77"), Some(Record::Work(_))));
        let eps = store.to_episodes(&format!("{}/", TOC));
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].url, format!("{}/episodes/5", TOC));
        Ok(())
    }

    #[test]
    fn episode_id_falls_back_to_key() {
        let json = next_data(r#"{"Work:1":{"id":"1"},"Episode:42":{"title":"t"}}"#);
        let eps = episodes_from_next_data(&json, TOC);
        assert_eq!(eps[0].url, format!("{}/episodes/42", TOC));
    }

    #[test]
    fn non_numeric_episode_keys_are_ignored() {
        let json = next_data(r#"{"Work:1":{"id":"1"},"Episode:abc":{"id":"abc","title":"t"}}"#);
        assert!(episodes_from_next_data(&json, TOC).is_empty());
    }

    #[test]
    fn missing_state_or_bad_json_is_empty() {
        assert!(episodes_from_next_data(r#"{"props":{}}"#, TOC).is_empty());
        assert!(episodes_from_next_data("{not json", TOC).is_empty());
    }

    #[test]
    fn next_data_script_is_found_in_html() {
        let html = r#"<html><body><div id="__next"></div>
<script id="__NEXT_DATA__" type="application/json">{"props":{}}</script></body></html>"#;
        assert_eq!(next_data_from_html(html).as_deref(), Some(r#"{"props":{}}"#));
        assert!(next_data_from_html("<html></html>").is_none());
    }
}
