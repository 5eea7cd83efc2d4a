use thiserror::Error;

use crate::limits::{enforce_max_chars, LimitError, MAX_CATEGORY_CHARS, MAX_QUERY_CHARS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing query parameter 'q'")]
    MissingQuery,
    #[error("invalid page {0:?}; expected an integer >= 1")]
    InvalidPage(String),
    #[error("missing category")]
    MissingCategory,
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error(transparent)]
    Limit(#[from] LimitError),
}

/// Decoded `application/x-www-form-urlencoded` query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let pairs = raw
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(pair), String::new()),
            })
            .collect();
        Self(pairs)
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "" | "1" | "true" | "yes" | "on"
            )
        })
    }
}

fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced)
        .decode_utf8_lossy()
        .to_string()
}

/// 1-based page number; absent means page 1.
pub fn parse_page(raw: Option<&str>) -> Result<u32, ParamError> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    match raw.trim().parse::<u32>() {
        Ok(page) if page >= 1 => Ok(page),
        _ => Err(ParamError::InvalidPage(raw.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub q: String,
    pub page: u32,
}

impl SearchParams {
    pub fn from_query(params: &QueryParams) -> Result<Self, ParamError> {
        let q = params.get("q").map(str::trim).unwrap_or_default();
        if q.is_empty() {
            return Err(ParamError::MissingQuery);
        }
        enforce_max_chars("query", q, MAX_QUERY_CHARS)?;
        let page = parse_page(params.get("page"))?;
        Ok(Self {
            q: q.to_string(),
            page,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryParams {
    /// Every entry in one response.
    All,
    Page(u32),
}

impl HistoryParams {
    pub fn from_query(params: &QueryParams) -> Result<Self, ParamError> {
        if params.flag("all") {
            return Ok(HistoryParams::All);
        }
        Ok(HistoryParams::Page(parse_page(params.get("page"))?))
    }
}

#[cfg_attr(feature = "json", derive(serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRequest {
    pub category: String,
}

impl ClickRequest {
    pub fn validated(self) -> Result<Self, ParamError> {
        let category = self.category.trim();
        if category.is_empty() {
            return Err(ParamError::MissingCategory);
        }
        enforce_max_chars("category", category, MAX_CATEGORY_CHARS)?;
        Ok(Self {
            category: category.to_string(),
        })
    }

    #[cfg(feature = "json")]
    pub fn from_json(body: &[u8]) -> Result<Self, ParamError> {
        #[derive(serde::Deserialize)]
        struct Raw {
            category: Option<String>,
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ParamError::MissingCategory);
        }
        let raw: Raw =
            serde_json::from_slice(body).map_err(|e| ParamError::MalformedBody(e.to_string()))?;
        Self {
            category: raw.category.unwrap_or_default(),
        }
        .validated()
    }
}
