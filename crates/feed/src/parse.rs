//! Feed response parsing.
//!
//! The service answers with
//! `{feed:{entry:[{title:{$t}, author:[{name:{$t}}], media$group:{...}}]}}`.
//! Each entry is parsed on its own so one malformed entry does not cost the
//! rest of the page.

use crate::error::Result;
use crate::record::{Feed, PhotoRecord};
use photoview_cache::{CacheError, ResourceDecoder};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct Text {
    #[serde(rename = "$t")]
    text: String,
}

#[derive(Deserialize)]
struct Author {
    name: Text,
}

#[derive(Deserialize)]
struct MediaLink {
    url: String,
}

#[derive(Deserialize)]
struct MediaGroup {
    #[serde(rename = "media$thumbnail")]
    thumbnails: Vec<MediaLink>,
    #[serde(rename = "media$content")]
    contents: Vec<MediaLink>,
}

#[derive(Deserialize)]
struct Entry {
    title: Text,
    author: Vec<Author>,
    #[serde(rename = "media$group")]
    media: MediaGroup,
}

impl Entry {
    fn into_record(self) -> Option<PhotoRecord> {
        let author = self.author.into_iter().next()?.name.text;
        let thumb_url = self.media.thumbnails.into_iter().next()?.url;
        let image_url = self.media.contents.into_iter().next()?.url;
        Some(PhotoRecord::new(self.title.text, author, thumb_url, image_url))
    }
}

/// Parse a feed response.
///
/// Bytes that are not a JSON object are an error. A document without a
/// `feed.entry` array, or whose entries all fail to parse, yields the
/// single "No Results" record.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    let document: serde_json::Map<String, Value> = serde_json::from_slice(bytes)?;

    let Some(entries) = document
        .get("feed")
        .and_then(|feed| feed.get("entry"))
        .and_then(Value::as_array)
    else {
        log::debug!("feed has no entries");
        return Ok(Feed::no_results());
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let record = Entry::deserialize(entry)
            .ok()
            .and_then(Entry::into_record);
        match record {
            Some(record) => {
                log::debug!("parsed entry {index}: {} by {}", record.title, record.author);
                records.push(record);
            }
            None => log::warn!("skipping malformed feed entry {index}"),
        }
    }

    if records.is_empty() {
        return Ok(Feed::no_results());
    }
    Ok(Feed::new(records))
}

/// Cache decoder for the feed namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedDecoder;

impl ResourceDecoder<Feed> for FeedDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> photoview_cache::Result<Feed> {
        parse_feed(bytes).map_err(|e| CacheError::Parse {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> String {
        format!(
            r#"{{"title":{{"$t":"{title}"}},
                "author":[{{"name":{{"$t":"ann"}}}}],
                "updated":{{"$t":"2012-01-01"}},
                "media$group":{{
                    "media$thumbnail":[{{"url":"http://img/{title}-t.jpg"}}],
                    "media$content":[{{"url":"http://img/{title}.jpg"}}]}}}}"#
        )
    }

    #[test]
    fn test_parse_entries_in_order() {
        let body = format!(r#"{{"feed":{{"entry":[{},{}]}}}}"#, entry("one"), entry("two"));
        let feed = parse_feed(body.as_bytes()).unwrap();

        assert_eq!(feed.len(), 2);
        assert_eq!(feed.records()[0].title, "one");
        assert_eq!(feed.records()[0].author, "ann");
        assert_eq!(feed.records()[0].thumb_url, "http://img/one-t.jpg");
        assert_eq!(feed.records()[1].image_url, "http://img/two.jpg");
    }

    #[test]
    fn test_bad_entry_is_skipped() {
        let body = format!(
            r#"{{"feed":{{"entry":[{},{{"title":{{"$t":"broken"}}}},{}]}}}}"#,
            entry("one"),
            entry("three")
        );
        let feed = parse_feed(body.as_bytes()).unwrap();

        let titles: Vec<_> = feed.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["one", "three"]);
    }

    #[test]
    fn test_empty_author_list_is_skipped() {
        let body = r#"{"feed":{"entry":[{"title":{"$t":"x"},"author":[],
            "media$group":{"media$thumbnail":[{"url":"t"}],"media$content":[{"url":"c"}]}}]}}"#;
        let feed = parse_feed(body.as_bytes()).unwrap();
        assert!(feed.records()[0].is_placeholder());
    }

    #[test]
    fn test_no_entries_yields_sentinel() {
        for body in [r#"{"feed":{}}"#, r#"{"feed":{"entry":[]}}"#, r#"{}"#, r#"{"feed":{"entry":[{}]}}"#] {
            let feed = parse_feed(body.as_bytes()).unwrap();
            assert_eq!(feed.len(), 1, "{body}");
            assert_eq!(feed.records()[0].thumb_url, "");
            assert_eq!(feed.records()[0].image_url, "");
        }
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_feed(b"<html>502</html>").is_err());
        assert!(parse_feed(b"[1,2,3]").is_err());
    }

    #[test]
    fn test_decoder_maps_to_parse_error() {
        let result = FeedDecoder.decode("http://feed", b"not json");
        assert!(matches!(result, Err(CacheError::Parse { .. })));
    }
}
