use serde_json::{Map, Value};

/// The shapes listing images have been written in over time
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// `images: ["url", ...]`
    List(Vec<Value>),
    /// `images: {"0": "url", "1": "url"}` or `images: {"image1": "url"}`
    Nested(Map<String, Value>),
    /// Top-level `image1Url`, `image2Url`, ... keys
    Numbered(Vec<(u32, String)>),
}

impl ImageSource {
    /// Detects which shape a property record uses.
    ///
    /// An `images` field takes precedence over numbered keys.
    pub fn detect(record: &Value) -> Option<Self> {
        match record.get("images") {
            Some(Value::Array(items)) => return Some(ImageSource::List(items.clone())),
            Some(Value::Object(map)) => return Some(ImageSource::Nested(map.clone())),
            _ => {}
        }

        let numbered: Vec<(u32, String)> = record
            .as_object()?
            .iter()
            .filter_map(|(key, value)| {
                let n = numbered_key(key, "image", "Url")?;
                Some((n, value.as_str()?.to_string()))
            })
            .collect();

        if numbered.is_empty() {
            None
        } else {
            Some(ImageSource::Numbered(numbered))
        }
    }

    /// Ordered list of non-empty URLs
    pub fn into_urls(self) -> Vec<String> {
        let mut ordered: Vec<(u32, String)> = match self {
            ImageSource::List(items) => items
                .into_iter()
                .enumerate()
                .filter_map(|(i, v)| Some((i as u32, v.as_str()?.to_string())))
                .collect(),
            ImageSource::Nested(map) => map
                .into_iter()
                .filter_map(|(key, v)| {
                    // Unrecognised keys go last, in encounter order (the sort is stable)
                    let order = key
                        .parse::<u32>()
                        .ok()
                        .or_else(|| numbered_key(&key, "image", ""))
                        .or_else(|| numbered_key(&key, "image", "Url"))
                        .unwrap_or(u32::MAX);
                    Some((order, v.as_str()?.to_string()))
                })
                .collect(),
            ImageSource::Numbered(pairs) => pairs,
        };

        ordered.sort_by_key(|(order, _)| *order);
        ordered
            .into_iter()
            .map(|(_, url)| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

/// Normalizes whatever image shape a record carries into an ordered list
pub fn decode_images(record: &Value) -> Vec<String> {
    ImageSource::detect(record)
        .map(ImageSource::into_urls)
        .unwrap_or_default()
}

/// `image3Url` -> 3 for prefix `image` and suffix `Url`
fn numbered_key(key: &str, prefix: &str, suffix: &str) -> Option<u32> {
    key.strip_prefix(prefix)?
        .strip_suffix(suffix)?
        .parse()
        .ok()
}
